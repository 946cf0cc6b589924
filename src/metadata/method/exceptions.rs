//! Exception handler regions of CIL method bodies.
//!
//! Regions are expressed over instruction ids rather than byte offsets. Every marker is
//! a required field except the end of a block, which may coincide with the end of the
//! body. That state is the explicit [`RegionEnd::EndOfBody`] instead of a missing
//! instruction, so a region can never point at "nothing" by accident.
//!
//! # Layout in IL
//!
//! ```text
//! try_start ... (try_end)        protected block, try_end is exclusive
//! handler_start ... (handler_end) handler block, handler_end is exclusive
//! ```
//!
//! A filter region additionally has a filter block starting at `filter_start` and
//! running up to `handler_start`.

use std::ops::Range;

use bitflags::bitflags;

use crate::{assembly::InstrId, metadata::signatures::TypeSignature, Result};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These are the values stored in an encoded method body's exception section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Kind of handler attached to a protected block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// Catches exceptions assignable to the given type
    Catch(TypeSignature),
    /// Runs the filter block to decide whether the handler catches the exception
    Filter {
        /// First instruction of the filter block
        filter_start: InstrId,
    },
    /// Runs whenever control leaves the protected block
    Finally,
    /// Runs only when the protected block exits with an exception
    Fault,
}

/// Exclusive end marker of a try or handler block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionEnd {
    /// The block ends right before this instruction
    At(InstrId),
    /// The block extends to the last instruction of the body
    EndOfBody,
}

impl RegionEnd {
    /// The instruction marking the end, if any
    #[must_use]
    pub fn instruction(&self) -> Option<InstrId> {
        match self {
            RegionEnd::At(id) => Some(*id),
            RegionEnd::EndOfBody => None,
        }
    }
}

/// An exception handling region of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Handler kind
    pub kind: HandlerKind,
    /// First protected instruction
    pub try_start: InstrId,
    /// End of the protected block
    pub try_end: RegionEnd,
    /// First handler instruction
    pub handler_start: InstrId,
    /// End of the handler block
    pub handler_end: RegionEnd,
}

impl ExceptionRegion {
    /// A typed catch clause
    #[must_use]
    pub fn catch(
        catch_type: TypeSignature,
        try_start: InstrId,
        try_end: InstrId,
        handler_start: InstrId,
        handler_end: RegionEnd,
    ) -> Self {
        ExceptionRegion {
            kind: HandlerKind::Catch(catch_type),
            try_start,
            try_end: RegionEnd::At(try_end),
            handler_start,
            handler_end,
        }
    }

    /// A finally clause
    #[must_use]
    pub fn finally(
        try_start: InstrId,
        try_end: InstrId,
        handler_start: InstrId,
        handler_end: RegionEnd,
    ) -> Self {
        ExceptionRegion {
            kind: HandlerKind::Finally,
            try_start,
            try_end: RegionEnd::At(try_end),
            handler_start,
            handler_end,
        }
    }

    /// A fault clause
    #[must_use]
    pub fn fault(
        try_start: InstrId,
        try_end: InstrId,
        handler_start: InstrId,
        handler_end: RegionEnd,
    ) -> Self {
        ExceptionRegion {
            kind: HandlerKind::Fault,
            try_start,
            try_end: RegionEnd::At(try_end),
            handler_start,
            handler_end,
        }
    }

    /// A filter clause, the filter block runs from `filter_start` up to `handler_start`
    #[must_use]
    pub fn filter(
        try_start: InstrId,
        try_end: InstrId,
        filter_start: InstrId,
        handler_start: InstrId,
        handler_end: RegionEnd,
    ) -> Self {
        ExceptionRegion {
            kind: HandlerKind::Filter { filter_start },
            try_start,
            try_end: RegionEnd::At(try_end),
            handler_start,
            handler_end,
        }
    }

    /// Encoded clause flags
    #[must_use]
    pub fn flags(&self) -> ExceptionHandlerFlags {
        match self.kind {
            HandlerKind::Catch(_) => ExceptionHandlerFlags::EXCEPTION,
            HandlerKind::Filter { .. } => ExceptionHandlerFlags::FILTER,
            HandlerKind::Finally => ExceptionHandlerFlags::FINALLY,
            HandlerKind::Fault => ExceptionHandlerFlags::FAULT,
        }
    }

    /// Every instruction the region refers to
    #[must_use]
    pub fn markers(&self) -> Vec<InstrId> {
        let mut markers = vec![self.try_start, self.handler_start];
        markers.extend(self.try_end.instruction());
        markers.extend(self.handler_end.instruction());
        if let HandlerKind::Filter { filter_start } = self.kind {
            markers.push(filter_start);
        }
        markers
    }

    /// Rewrites every marker through `map`, keeping [`RegionEnd::EndOfBody`] as is
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `map`.
    pub fn map_markers<F>(&self, mut map: F) -> Result<ExceptionRegion>
    where
        F: FnMut(InstrId) -> Result<InstrId>,
    {
        let mut map_end = |end: RegionEnd| -> Result<RegionEnd> {
            Ok(match end {
                RegionEnd::At(id) => RegionEnd::At(map(id)?),
                RegionEnd::EndOfBody => RegionEnd::EndOfBody,
            })
        };
        let try_end = map_end(self.try_end)?;
        let handler_end = map_end(self.handler_end)?;

        let kind = match &self.kind {
            HandlerKind::Filter { filter_start } => HandlerKind::Filter {
                filter_start: map(*filter_start)?,
            },
            other => other.clone(),
        };

        Ok(ExceptionRegion {
            kind,
            try_start: map(self.try_start)?,
            try_end,
            handler_start: map(self.handler_start)?,
            handler_end,
        })
    }
}

/// A region resolved to instruction positions of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpan {
    /// Index of the region in the body's region table
    pub index: usize,
    /// Positions of the protected block
    pub try_range: Range<usize>,
    /// Positions of the handler block
    pub handler_range: Range<usize>,
    /// Position of the first filter instruction, for filter regions
    pub filter_start: Option<usize>,
}

impl RegionSpan {
    /// True if the position lies in the protected block
    #[must_use]
    pub fn protects(&self, position: usize) -> bool {
        self.try_range.contains(&position)
    }

    /// True if the position lies in the handler block or filter block
    #[must_use]
    pub fn in_handler(&self, position: usize) -> bool {
        if self.handler_range.contains(&position) {
            return true;
        }
        match self.filter_start {
            Some(start) => (start..self.handler_range.start).contains(&position),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_flags() {
        let catch = ExceptionRegion::catch(
            TypeSignature::Object,
            InstrId(0),
            InstrId(2),
            InstrId(2),
            RegionEnd::At(InstrId(4)),
        );
        assert_eq!(catch.flags(), ExceptionHandlerFlags::EXCEPTION);

        let finally = ExceptionRegion::finally(InstrId(0), InstrId(2), InstrId(2), RegionEnd::EndOfBody);
        assert_eq!(finally.flags(), ExceptionHandlerFlags::FINALLY);

        let fault = ExceptionRegion::fault(InstrId(0), InstrId(2), InstrId(2), RegionEnd::EndOfBody);
        assert_eq!(fault.flags(), ExceptionHandlerFlags::FAULT);
    }

    #[test]
    fn test_markers_include_filter_and_skip_end_of_body() {
        let region = ExceptionRegion::filter(
            InstrId(1),
            InstrId(3),
            InstrId(3),
            InstrId(6),
            RegionEnd::EndOfBody,
        );
        let markers = region.markers();
        assert_eq!(markers.len(), 4);
        assert!(markers.contains(&InstrId(6)));
        assert!(markers.contains(&InstrId(3)));
    }

    #[test]
    fn test_map_markers() {
        let region = ExceptionRegion::finally(InstrId(1), InstrId(5), InstrId(5), RegionEnd::EndOfBody);
        let mapped = region.map_markers(|id| Ok(InstrId(id.0 + 100))).unwrap();
        assert_eq!(mapped.try_start, InstrId(101));
        assert_eq!(mapped.try_end, RegionEnd::At(InstrId(105)));
        assert_eq!(mapped.handler_end, RegionEnd::EndOfBody);
    }

    #[test]
    fn test_map_markers_propagates_errors() {
        let region = ExceptionRegion::fault(InstrId(1), InstrId(5), InstrId(5), RegionEnd::At(InstrId(7)));
        let result = region.map_markers(|id| {
            if id == InstrId(7) {
                Err(Error::UnmappedInstruction(id))
            } else {
                Ok(id)
            }
        });
        assert!(matches!(result, Err(Error::UnmappedInstruction(InstrId(7)))));
    }

    #[test]
    fn test_span_membership() {
        let span = RegionSpan {
            index: 0,
            try_range: 0..3,
            handler_range: 5..8,
            filter_start: Some(3),
        };
        assert!(span.protects(2));
        assert!(!span.protects(3));
        assert!(span.in_handler(4));
        assert!(span.in_handler(7));
        assert!(!span.in_handler(8));
    }
}
