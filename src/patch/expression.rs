//! `meta.broken` condition text for a platform set

use crate::platform::{Os, Platform};
use std::collections::BTreeSet;

/// Build the broken condition for `platforms`.
///
/// Both platforms of an OS collapse to that OS's short predicate. The other
/// platforms get explicit OS-and-architecture predicates, parenthesized when
/// there is more than one term. The full supported set is simply `true`.
pub fn broken_expression(platforms: &BTreeSet<Platform>) -> String {
    if platforms.len() == Platform::all().len() {
        return "true".to_string();
    }
    if platforms.is_empty() {
        return "false".to_string();
    }

    let mut remaining = platforms.clone();
    let mut terms: Vec<String> = Vec::new();

    for os in Os::all() {
        let pair = os.platforms();
        if pair.iter().all(|p| remaining.contains(p)) {
            for p in &pair {
                remaining.remove(p);
            }
            terms.push(os.predicate().to_string());
        }
    }

    let parenthesize = terms.len() + remaining.len() > 1;
    for platform in &remaining {
        if parenthesize {
            terms.push(format!("({})", platform.predicate()));
        } else {
            terms.push(platform.predicate());
        }
    }

    terms.join(" || ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(platforms: &[Platform]) -> String {
        broken_expression(&platforms.iter().copied().collect())
    }

    #[test]
    fn single_platform_is_bare() {
        assert_eq!(
            expr(&[Platform::Aarch64Linux]),
            "stdenv.hostPlatform.isLinux && stdenv.hostPlatform.isAarch64"
        );
    }

    #[test]
    fn os_pair_collapses() {
        assert_eq!(
            expr(&[Platform::X86_64Linux, Platform::Aarch64Linux]),
            "stdenv.hostPlatform.isLinux"
        );
        assert_eq!(
            expr(&[Platform::X86_64Darwin, Platform::Aarch64Darwin]),
            "stdenv.hostPlatform.isDarwin"
        );
    }

    #[test]
    fn all_platforms_is_true() {
        assert_eq!(expr(Platform::all()), "true");
    }

    #[test]
    fn mixed_terms_are_parenthesized() {
        assert_eq!(
            expr(&[Platform::Aarch64Linux, Platform::X86_64Linux, Platform::X86_64Darwin]),
            "stdenv.hostPlatform.isLinux || (stdenv.hostPlatform.isDarwin && stdenv.hostPlatform.isx86_64)"
        );
        assert_eq!(
            expr(&[Platform::Aarch64Darwin, Platform::X86_64Linux]),
            "(stdenv.hostPlatform.isDarwin && stdenv.hostPlatform.isAarch64) || \
             (stdenv.hostPlatform.isLinux && stdenv.hostPlatform.isx86_64)"
        );
    }
}
