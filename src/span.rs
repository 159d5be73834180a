/// A location in the processor description source: file ID + byte range.
///
/// Behavior-graph nodes carry the span of the description construct they
/// were derived from so lowering diagnostics can point back at it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub file_id: u16,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file_id: u16, start: u32, end: u32) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }

    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// Prefer `self`, fall back to `other` when `self` carries no location.
    pub fn or(self, other: Span) -> Span {
        if self.is_dummy() {
            other
        } else {
            self
        }
    }

    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id);
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_span() {
        assert!(Span::dummy().is_dummy());
        assert!(!Span::new(0, 3, 9).is_dummy());
    }

    #[test]
    fn test_or_prefers_real_location() {
        let real = Span::new(0, 4, 8);
        assert_eq!(Span::dummy().or(real), real);
        assert_eq!(real.or(Span::new(0, 1, 2)), real);
    }

    #[test]
    fn test_merge() {
        let merged = Span::new(0, 10, 12).merge(Span::new(0, 4, 11));
        assert_eq!(merged.start, 4);
        assert_eq!(merged.end, 12);
    }
}
