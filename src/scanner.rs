//! Byte scanning primitives for SIP payloads
//!
//! Everything here works on borrowed byte slices and never allocates.
//! Split results land in [`Sections`], a fixed-capacity container that
//! lives on the caller's stack, so each parsing call owns its scratch space.

const EMPTY: &[u8] = &[];

/// Fixed-capacity list of byte views produced by [`split_sections`]
#[derive(Debug, Clone, Copy)]
pub struct Sections<'a, const N: usize> {
    items: [&'a [u8]; N],
    len: usize,
}

impl<'a, const N: usize> Sections<'a, N> {
    /// Create an empty container
    pub fn new() -> Self {
        Self {
            items: [EMPTY; N],
            len: 0,
        }
    }

    /// Split `input` on `delim` into a fresh container
    pub fn split(input: &'a [u8], delim: &[u8]) -> Self {
        let mut sections = Self::new();
        split_sections(input, delim, &mut sections);
        sections
    }

    /// Maximum number of sections this container holds
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once no further section fits
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Get a section by index
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.as_slice().get(index).copied()
    }

    /// View the produced sections
    pub fn as_slice(&self) -> &[&'a [u8]] {
        &self.items[..self.len]
    }

    /// Iterate over the produced sections
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.as_slice().iter().copied()
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn push(&mut self, section: &'a [u8]) -> bool {
        if self.len == N {
            return false;
        }
        self.items[self.len] = section;
        self.len += 1;
        true
    }
}

impl<'a, const N: usize> Default for Sections<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive prefix match bounded by the keyword's length
///
/// # Examples
/// ```
/// use spycraft::scanner::match_keyword;
///
/// assert!(match_keyword(b"Call-ID", b"call-id"));
/// assert!(!match_keyword(b"x", b"call-id"));
/// ```
pub fn match_keyword(field: &[u8], keyword: &[u8]) -> bool {
    field.len() >= keyword.len() && field[..keyword.len()].eq_ignore_ascii_case(keyword)
}

/// Split a line on the first `separator` into a trimmed key and value
///
/// The value is empty when the separator is the last byte. Both halves
/// are empty when the separator is absent.
pub fn split_keypair(line: &[u8], separator: u8) -> (&[u8], &[u8]) {
    match line.iter().position(|&b| b == separator) {
        Some(pos) => {
            let key = trim(&line[..pos]);
            let value = if pos + 1 < line.len() {
                trim(&line[pos + 1..])
            } else {
                EMPTY
            };
            (key, value)
        }
        None => (EMPTY, EMPTY),
    }
}

/// Split `input` on exact occurrences of `delim` into `out`
///
/// Empty sections are skipped, splitting stops once `out` is full, and the
/// trailing remainder is kept when there is still room. Returns the number
/// of sections produced; `out` is cleared first.
pub fn split_sections<'a, const N: usize>(
    input: &'a [u8],
    delim: &[u8],
    out: &mut Sections<'a, N>,
) -> usize {
    out.clear();
    let dlen = delim.len();
    if dlen == 0 {
        return 0;
    }

    let mut start = 0;
    let mut i = 0;
    while i + dlen <= input.len() {
        if &input[i..i + dlen] != delim {
            i += 1;
            continue;
        }
        if i > start && !out.push(&input[start..i]) {
            // full: the remainder is not represented
            return out.len();
        }
        start = i + dlen;
        i = start;
    }

    if start < input.len() {
        out.push(&input[start..]);
    }
    out.len()
}

/// Extract the Content-Length value from a header block
///
/// Only CRLF-terminated lines are inspected. Returns 0 when the header is
/// missing or carries no leading digits.
pub fn parse_content_length(headers: &[u8]) -> usize {
    const KEY: &[u8] = b"content-length:";

    let mut rest = headers;
    while let Some(end) = find(rest, b"\r\n") {
        let line = &rest[..end];
        rest = &rest[end + 2..];
        if !match_keyword(line, KEY) {
            continue;
        }

        let value = &line[KEY.len()..];
        let digits = value
            .iter()
            .skip_while(|&&b| b == b' ' || b == b'\t')
            .take_while(|b| b.is_ascii_digit());
        return digits.fold(0usize, |n, &b| {
            n.saturating_mul(10).saturating_add((b - b'0') as usize)
        });
    }
    0
}

/// Position of the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Trim ASCII whitespace on both ends
pub fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_keyword() {
        assert!(match_keyword(b"Call-ID", b"call-id"));
        assert!(match_keyword(b"CALL-ID", b"call-id"));
        assert!(!match_keyword(b"x", b"call-id"));
        assert!(!match_keyword(b"Call-Info", b"call-id"));
        // prefix bounded by the keyword
        assert!(match_keyword(b"INVITE-ish", b"invite"));
        assert!(match_keyword(b"anything", b""));
    }

    #[test]
    fn test_split_keypair() {
        assert_eq!(
            split_keypair(b"Call-ID: abc123", b':'),
            (&b"Call-ID"[..], &b"abc123"[..])
        );
        assert_eq!(split_keypair(b"Call-ID:", b':'), (&b"Call-ID"[..], &b""[..]));
        assert_eq!(
            split_keypair(b"  To :  <sip:bob@host:5060>  ", b':'),
            (&b"To"[..], &b"<sip:bob@host:5060>"[..])
        );
        assert_eq!(split_keypair(b"no separator", b':'), (&b""[..], &b""[..]));
    }

    #[test]
    fn test_split_sections_basic() {
        let mut out = Sections::<4>::new();
        let count = split_sections(b"a b c", b" ", &mut out);
        assert_eq!(count, 3);
        assert_eq!(out.as_slice(), &[&b"a"[..], &b"b"[..], &b"c"[..]]);
    }

    #[test]
    fn test_split_sections_respects_capacity() {
        let mut out = Sections::<3>::new();
        let count = split_sections(b"INVITE sip:bob@host SIP/2.0 extra", b" ", &mut out);
        assert_eq!(count, 3);
        assert!(out.is_full());
        assert_eq!(out.get(2), Some(&b"SIP/2.0"[..]));

        let mut tiny = Sections::<1>::new();
        assert_eq!(split_sections(b"a,b,c,d,e,f", b",", &mut tiny), 1);
    }

    #[test]
    fn test_split_sections_skips_empty() {
        let mut out = Sections::<8>::new();
        split_sections(b"\r\n\r\nabc\r\n\r\ndef\r\n", b"\r\n", &mut out);
        assert_eq!(out.as_slice(), &[&b"abc"[..], &b"def"[..]]);
        assert!(out.iter().all(|section| !section.is_empty()));
    }

    #[test]
    fn test_split_sections_degenerate() {
        let mut out = Sections::<4>::new();
        assert_eq!(split_sections(b"", b"\r\n", &mut out), 0);
        assert_eq!(split_sections(b"abc", b"", &mut out), 0);
        assert_eq!(split_sections(b"abc", b"\r\n\r\n", &mut out), 1);
        assert_eq!(out.get(0), Some(&b"abc"[..]));
    }

    #[test]
    fn test_split_sections_reuse_clears() {
        let mut out = Sections::<4>::new();
        split_sections(b"a b c d", b" ", &mut out);
        split_sections(b"x", b" ", &mut out);
        assert_eq!(out.as_slice(), &[&b"x"[..]]);
    }

    #[test]
    fn test_split_sections_never_exceeds_capacity() {
        let inputs: [&[u8]; 5] = [
            b"",
            b"::::",
            b"a:b:c:d:e:f:g:h:i",
            b":a::b:::c::::",
            b"no delimiter at all",
        ];
        for input in inputs {
            let mut out = Sections::<2>::new();
            let count = split_sections(input, b":", &mut out);
            assert!(count <= 2);
            assert_eq!(count, out.len());
            assert!(out.iter().all(|section| !section.is_empty()));
        }
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length(b"Via: x\r\nTo: y\r\n\r\n"), 0);
        assert_eq!(
            parse_content_length(b"Via: x\r\nContent-Length: 42\r\nTo: y\r\n\r\n"),
            42
        );
        assert_eq!(parse_content_length(b"content-length:\t7\r\n"), 7);
        assert_eq!(parse_content_length(b"Content-Length: abc\r\n"), 0);
        // unterminated final line is not inspected
        assert_eq!(parse_content_length(b"Content-Length: 12"), 0);
    }

    #[test]
    fn test_find_and_trim() {
        assert_eq!(find(b"abc\r\n\r\nbody", b"\r\n\r\n"), Some(3));
        assert_eq!(find(b"abc", b"\r\n"), None);
        assert_eq!(trim(b"  value \t"), b"value");
        assert_eq!(trim(b"   "), b"");
    }
}
