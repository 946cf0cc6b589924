//! Ordered aspect declarations of one member.
//!
//! Aspects on a member form a chain of responsibility ordered by priority: the head is
//! the outermost aspect and every later aspect would be reached through the "proceed"
//! continuation of the one before it. Code generation currently honors the head only.
//! The remaining declarations are kept as [`AspectChain::deferred`], or split off with
//! [`AspectChain::select`], so the driver can report them and generation can grow to
//! nested continuations without changing discovery.

use crate::weaver::discovery::{AspectDeclaration, AspectKind};

/// Priority-ordered aspect declarations of a member.
#[derive(Debug, Clone, Default)]
pub struct AspectChain<'r> {
    declarations: Vec<AspectDeclaration<'r>>,
}

impl<'r> AspectChain<'r> {
    /// Orders `declarations` by ascending priority. Equal priorities keep their order.
    #[must_use]
    pub fn new(mut declarations: Vec<AspectDeclaration<'r>>) -> Self {
        declarations.sort_by_key(|declaration| declaration.priority);
        AspectChain { declarations }
    }

    /// The aspect that is applied
    #[must_use]
    pub fn head(&self) -> Option<&AspectDeclaration<'r>> {
        self.declarations.first()
    }

    /// Aspects that follow the head and are not applied
    #[must_use]
    pub fn deferred(&self) -> &[AspectDeclaration<'r>] {
        self.declarations.get(1..).unwrap_or_default()
    }

    /// Splits off the declaration to apply: the first one of the earliest kind in
    /// `preference`. Every other declaration stays in the returned chain, order preserved.
    #[must_use]
    pub fn select(&self, preference: &[AspectKind]) -> Option<(AspectDeclaration<'r>, AspectChain<'r>)> {
        let index = preference.iter().find_map(|kind| {
            self.declarations
                .iter()
                .position(|declaration| declaration.kind == *kind)
        })?;
        let mut rest = self.declarations.clone();
        let applied = rest.remove(index);
        Some((applied, AspectChain { declarations: rest }))
    }

    /// Declarations in application order
    #[must_use]
    pub fn as_slice(&self) -> &[AspectDeclaration<'r>] {
        &self.declarations
    }

    /// Declarations in application order
    pub fn iter(&self) -> impl Iterator<Item = &AspectDeclaration<'r>> {
        self.declarations.iter()
    }

    /// Number of declarations
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// True if the member has no aspect
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        token::{table, Token},
        typesystem::{Scope, TypeLocation},
    };
    use crate::weaver::discovery::DeclarationSource;

    fn declaration(kind: AspectKind, priority: i32, row: u32) -> AspectDeclaration<'static> {
        AspectDeclaration {
            kind,
            aspect_type: TypeLocation {
                scope: Scope::Target,
                token: Token::from_parts(table::TYPE_DEF, row),
            },
            properties: Vec::new(),
            priority,
            source: DeclarationSource::Member,
        }
    }

    #[test]
    fn test_head_is_lowest_priority() {
        let chain = AspectChain::new(vec![
            declaration(AspectKind::MethodInterception, 5, 1),
            declaration(AspectKind::MethodInterception, 1, 2),
            declaration(AspectKind::MethodInterception, 1, 3),
        ]);

        assert_eq!(chain.head().map(|d| d.aspect_type.token.row()), Some(2));
        let deferred: Vec<u32> = chain
            .deferred()
            .iter()
            .map(|d| d.aspect_type.token.row())
            .collect();
        assert_eq!(deferred, vec![3, 1]);
    }

    #[test]
    fn test_select_prefers_earlier_kind() {
        let chain = AspectChain::new(vec![
            declaration(AspectKind::MethodBoundary, 2, 1),
            declaration(AspectKind::MethodInterception, 3, 2),
            declaration(AspectKind::MethodBoundary, -1, 3),
        ]);

        let (applied, rest) = chain
            .select(&[AspectKind::MethodInterception, AspectKind::MethodBoundary])
            .unwrap();
        assert_eq!(applied.aspect_type.token.row(), 2);
        let rest: Vec<u32> = rest.iter().map(|d| d.aspect_type.token.row()).collect();
        assert_eq!(rest, vec![3, 1]);

        let (applied, rest) = chain.select(&[AspectKind::MethodBoundary]).unwrap();
        assert_eq!(applied.priority, -1);
        assert_eq!(rest.len(), 2);
        assert!(chain.select(&[AspectKind::LocationInterception]).is_none());
    }

    #[test]
    fn test_empty_chain() {
        let chain = AspectChain::default();
        assert!(chain.head().is_none());
        assert!(chain.deferred().is_empty());
    }
}
