use std::{fmt::Display, ops::Deref};

/// Half-open byte range into either the grammar source or the parsed input.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        debug_assert!(start <= end);
        Self { start, end }
    }
    pub fn at(pos: u32) -> Span {
        Self {
            start: pos,
            end: pos,
        }
    }
    /// A one byte wide span, the default width of a diagnostic pointing at a cursor.
    pub fn point(pos: u32) -> Span {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
    #[track_caller]
    pub fn as_str(self, src: &str) -> &str {
        &src[self.start as usize..self.end as usize]
    }
    pub fn start(self) -> u32 {
        self.start
    }
    pub fn end(self) -> u32 {
        self.end
    }
    /// Moves the end of the span, the start stays put.
    pub fn widen_to(self, end: u32) -> Span {
        Span::new(self.start, u32::max(self.end, end))
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Spanned<T> {
    pub inner: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Spanned<T> {
        Spanned { inner: value, span }
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
