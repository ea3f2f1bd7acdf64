
use nom::{
    AsBytes, Compare, CompareResult, FindSubstring, InputIter, InputLength, InputTake, Offset,
    Slice,
};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// Read-only window over a borrowed packet payload.
///
/// The view remembers how far it is from the start of the buffer it was cut
/// from, so sub-views produced by slicing (either directly or through `nom`
/// combinators) can always be traced back to an absolute position in the
/// captured packet. No line or column bookkeeping is done; payloads are binary.
#[derive(Debug, Clone, Copy)]
pub struct PayloadView<'a> {
    offset: usize,
    fragment: &'a [u8],
}

impl<'a> PayloadView<'a> {
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            offset: 0,
            fragment: buffer,
        }
    }

    /// Create a view that claims to start `offset` bytes into some larger
    /// buffer. Only the reported location is affected, reads stay within
    /// `fragment`.
    pub const fn with_offset(offset: usize, fragment: &'a [u8]) -> Self {
        Self { offset, fragment }
    }

    #[inline]
    pub const fn location_offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub const fn fragment(&self) -> &'a [u8] {
        self.fragment
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.fragment.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// Byte at `index`, relative to the start of the view.
    #[inline]
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.fragment.get(index).copied()
    }

    /// Position of the first occurrence of `needle`, relative to the start of
    /// the view.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.fragment
            .windows(needle.len())
            .position(|window| window == needle)
    }

    #[inline]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.fragment.starts_with(prefix)
    }

    /// Drop the first `count` bytes. `None` when the view is shorter.
    pub fn advance(&self, count: usize) -> Option<Self> {
        if count > self.fragment.len() {
            return None;
        }
        Some(self.slice(count..))
    }

    /// Bounds-checked sub-view.
    pub fn subview(&self, range: Range<usize>) -> Option<Self> {
        if range.start > range.end || range.end > self.fragment.len() {
            return None;
        }
        Some(self.slice(range))
    }

    /// Split into `[..mid]` and `[mid..]`. `None` when `mid` is out of bounds.
    pub fn split_at(&self, mid: usize) -> Option<(Self, Self)> {
        if mid > self.fragment.len() {
            return None;
        }
        Some((self.slice(..mid), self.slice(mid..)))
    }

    /// The view as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.fragment).ok()
    }
}

macro_rules! impl_slice {
    ($range:ty) => {
        impl<'a> Slice<$range> for PayloadView<'a> {
            #[inline]
            fn slice(&self, range: $range) -> Self {
                let next_fragment = self.fragment.slice(range);
                let consumed_len = self.fragment.offset(&next_fragment);
                PayloadView {
                    offset: self.offset + consumed_len,
                    fragment: next_fragment,
                }
            }
        }
    };
}

impl_slice!(Range<usize>);
impl_slice!(RangeTo<usize>);
impl_slice!(RangeFrom<usize>);
impl_slice!(RangeFull);

impl<'a> InputIter for PayloadView<'a> {
    type Item = u8;
    type Iter = std::iter::Enumerate<Self::IterElem>;
    type IterElem = std::iter::Copied<std::slice::Iter<'a, u8>>;

    #[inline]
    fn iter_indices(&self) -> Self::Iter {
        self.fragment.iter_indices()
    }

    #[inline]
    fn iter_elements(&self) -> Self::IterElem {
        self.fragment.iter_elements()
    }

    #[inline]
    fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(Self::Item) -> bool,
    {
        self.fragment.position(predicate)
    }

    #[inline]
    fn slice_index(&self, count: usize) -> Result<usize, nom::Needed> {
        self.fragment.slice_index(count)
    }
}

impl InputLength for PayloadView<'_> {
    #[inline]
    fn input_len(&self) -> usize {
        self.fragment.len()
    }
}

impl InputTake for PayloadView<'_> {
    #[inline]
    fn take(&self, count: usize) -> Self {
        self.slice(..count)
    }

    #[inline]
    fn take_split(&self, count: usize) -> (Self, Self) {
        (self.slice(count..), self.slice(..count))
    }
}

impl Offset for PayloadView<'_> {
    #[inline]
    fn offset(&self, second: &Self) -> usize {
        second.offset - self.offset
    }
}

impl core::ops::Deref for PayloadView<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.fragment
    }
}

impl AsBytes for PayloadView<'_> {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        self.fragment
    }
}

impl PartialEq for PayloadView<'_> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.fragment == other.fragment
    }
}

impl Eq for PayloadView<'_> {}

impl<'b> Compare<&'b [u8]> for PayloadView<'_> {
    #[inline(always)]
    fn compare(&self, t: &'b [u8]) -> CompareResult {
        self.fragment.compare(t)
    }

    #[inline(always)]
    fn compare_no_case(&self, t: &'b [u8]) -> CompareResult {
        self.fragment.compare_no_case(t)
    }
}

impl<'b> Compare<&'b str> for PayloadView<'_> {
    #[inline(always)]
    fn compare(&self, t: &'b str) -> CompareResult {
        self.fragment.compare(t)
    }

    #[inline(always)]
    fn compare_no_case(&self, t: &'b str) -> CompareResult {
        self.fragment.compare_no_case(t)
    }
}

impl<'b> FindSubstring<&'b [u8]> for PayloadView<'_> {
    #[inline]
    fn find_substring(&self, substr: &'b [u8]) -> Option<usize> {
        self.find(substr)
    }
}

impl<'b> FindSubstring<&'b str> for PayloadView<'_> {
    #[inline]
    fn find_substring(&self, substr: &'b str) -> Option<usize> {
        self.find(substr.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for PayloadView<'a> {
    #[inline]
    fn from(buffer: &'a [u8]) -> Self {
        Self::new(buffer)
    }
}
