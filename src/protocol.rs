//! Gopher protocol request framing and response encoding.
//!
//! A client sends one selector line per connection:
//! - empty line: listing of the serve root
//! - `path/`: listing of a subdirectory
//! - `path`: raw contents of a file
//!
//! Directory listings are rendered as tab-separated menu lines,
//! terminated by a single `.`.

use bytes::BytesMut;

/// Maximum selector length accepted before a terminator is seen
pub const MAX_SELECTOR_LENGTH: usize = 64 * 1024;

/// Item type code for text files
pub const ITEM_TYPE_TEXT_FILE: u8 = b'0';

/// Item type code for directories (and everything that is not a regular file)
pub const ITEM_TYPE_DIRECTORY: u8 = b'1';

/// Result of framing a request line
#[derive(Debug, PartialEq)]
pub enum ParseResult<'a> {
    /// A complete line: the selector (terminator stripped) and the number
    /// of bytes consumed, terminator included.
    Complete(&'a [u8], usize),
    /// No terminator yet; more data is needed.
    Incomplete,
    /// Stream ended with nothing buffered.
    Closed,
}

/// Frame one request line from `input`.
///
/// The first `\n` ends the line; a `\r` directly before it is stripped
/// as well, so both `\r\n` and bare `\n` clients are accepted. At end of
/// stream any unterminated data is returned as the final line.
pub fn parse_line(input: &[u8], at_eof: bool) -> ParseResult<'_> {
    if at_eof && input.is_empty() {
        return ParseResult::Closed;
    }

    if let Some(pos) = input.iter().position(|&b| b == b'\n') {
        let end = if pos > 0 && input[pos - 1] == b'\r' {
            pos - 1
        } else {
            pos
        };
        return ParseResult::Complete(&input[..end], pos + 1);
    }

    if at_eof {
        return ParseResult::Complete(input, input.len());
    }

    ParseResult::Incomplete
}

/// A request, classified from its selector.
///
/// Paths are raw selector bytes; filenames need not be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List a directory. `selector_base` prefixes each entry's selector.
    Listing { path: Vec<u8>, selector_base: Vec<u8> },
    /// Send a file's raw bytes.
    File { path: Vec<u8> },
}

impl Request {
    /// Classify a selector into a listing or file request
    pub fn from_selector(selector: &[u8]) -> Self {
        if selector.is_empty() {
            return Request::Listing {
                path: b".".to_vec(),
                selector_base: Vec::new(),
            };
        }

        match selector.strip_suffix(b"/") {
            Some(path) => Request::Listing {
                path: path.to_vec(),
                selector_base: selector.to_vec(),
            },
            None => Request::File {
                path: selector.to_vec(),
            },
        }
    }
}

/// Kind of a filesystem child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One child of a listed directory. The name is kept as the raw
/// filename bytes so it round-trips as a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: Vec<u8>,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<Vec<u8>>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Gopher response generator
pub struct Response;

impl Response {
    /// Render a directory listing.
    ///
    /// Each entry becomes `<type><name>\t<selector>\t<host>\t<port>\r\n`,
    /// in the order given. Non-file selectors get a trailing `/` so that
    /// following them requests another listing. The listing ends with `.`.
    pub fn listing(
        entries: &[DirectoryEntry],
        selector_base: &[u8],
        host: &str,
        port: u16,
    ) -> BytesMut {
        let port = port.to_string();
        let mut response = BytesMut::new();

        for entry in entries {
            if entry.is_file() {
                response.extend_from_slice(&[ITEM_TYPE_TEXT_FILE]);
            } else {
                response.extend_from_slice(&[ITEM_TYPE_DIRECTORY]);
            }
            response.extend_from_slice(&entry.name);
            response.extend_from_slice(b"\t");

            response.extend_from_slice(selector_base);
            response.extend_from_slice(&entry.name);
            if !entry.is_file() {
                response.extend_from_slice(b"/");
            }
            response.extend_from_slice(b"\t");

            response.extend_from_slice(host.as_bytes());
            response.extend_from_slice(b"\t");
            response.extend_from_slice(port.as_bytes());
            response.extend_from_slice(b"\r\n");
        }

        response.extend_from_slice(Response::terminator());
        response
    }

    /// End-of-listing marker
    pub fn terminator() -> &'static [u8] {
        b"."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crlf() {
        assert_eq!(parse_line(b"A\r\n", false), ParseResult::Complete(b"A", 3));
    }

    #[test]
    fn test_parse_bare_lf() {
        assert_eq!(parse_line(b"A\n", false), ParseResult::Complete(b"A", 2));
    }

    #[test]
    fn test_parse_first_line_only() {
        assert_eq!(
            parse_line(b"A\r\nB\n", false),
            ParseResult::Complete(b"A", 3)
        );
        assert_eq!(
            parse_line(b"A\nB\r\n", false),
            ParseResult::Complete(b"A", 2)
        );
    }

    #[test]
    fn test_parse_empty_line() {
        assert_eq!(parse_line(b"\r\n", false), ParseResult::Complete(b"", 2));
        assert_eq!(parse_line(b"\n", false), ParseResult::Complete(b"", 1));
    }

    #[test]
    fn test_parse_lone_cr_is_kept() {
        assert_eq!(
            parse_line(b"a\rb\n", false),
            ParseResult::Complete(b"a\rb", 4)
        );
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(parse_line(b"docs/", false), ParseResult::Incomplete);
        assert_eq!(parse_line(b"A\r", false), ParseResult::Incomplete);
        assert_eq!(parse_line(b"", false), ParseResult::Incomplete);
    }

    #[test]
    fn test_parse_unterminated_at_eof() {
        assert_eq!(parse_line(b"A", true), ParseResult::Complete(b"A", 1));
    }

    #[test]
    fn test_parse_empty_at_eof() {
        assert_eq!(parse_line(b"", true), ParseResult::Closed);
    }

    #[test]
    fn test_request_root() {
        assert_eq!(
            Request::from_selector(b""),
            Request::Listing {
                path: b".".to_vec(),
                selector_base: Vec::new(),
            }
        );
    }

    #[test]
    fn test_request_subdirectory() {
        assert_eq!(
            Request::from_selector(b"docs/"),
            Request::Listing {
                path: b"docs".to_vec(),
                selector_base: b"docs/".to_vec(),
            }
        );
        assert_eq!(
            Request::from_selector(b"docs/guides/"),
            Request::Listing {
                path: b"docs/guides".to_vec(),
                selector_base: b"docs/guides/".to_vec(),
            }
        );
    }

    #[test]
    fn test_request_file() {
        assert_eq!(
            Request::from_selector(b"readme.txt"),
            Request::File {
                path: b"readme.txt".to_vec(),
            }
        );
        assert_eq!(
            Request::from_selector(b"docs/intro.txt"),
            Request::File {
                path: b"docs/intro.txt".to_vec(),
            }
        );
    }

    #[test]
    fn test_request_non_utf8_selector() {
        assert_eq!(
            Request::from_selector(b"caf\xe9.txt"),
            Request::File {
                path: b"caf\xe9.txt".to_vec(),
            }
        );
    }

    #[test]
    fn test_listing_file_and_directory() {
        let entries = vec![
            DirectoryEntry::new("readme.txt", EntryKind::File),
            DirectoryEntry::new("docs", EntryKind::Directory),
        ];
        let listing = Response::listing(&entries, b"", "localhost", 70);
        assert_eq!(
            &listing[..],
            b"0readme.txt\treadme.txt\tlocalhost\t70\r\n1docs\tdocs/\tlocalhost\t70\r\n."
        );
    }

    #[test]
    fn test_listing_with_selector_base() {
        let entries = vec![
            DirectoryEntry::new("intro.txt", EntryKind::File),
            DirectoryEntry::new("link", EntryKind::Other),
        ];
        let listing = Response::listing(&entries, b"docs/", "example.org", 1234);
        assert_eq!(
            &listing[..],
            b"0intro.txt\tdocs/intro.txt\texample.org\t1234\r\n1link\tdocs/link/\texample.org\t1234\r\n."
        );
    }

    #[test]
    fn test_listing_keeps_raw_name_bytes() {
        let entries = vec![DirectoryEntry::new(b"caf\xe9.txt".to_vec(), EntryKind::File)];
        let listing = Response::listing(&entries, b"", "localhost", 70);
        assert_eq!(
            &listing[..],
            b"0caf\xe9.txt\tcaf\xe9.txt\tlocalhost\t70\r\n."
        );
    }

    #[test]
    fn test_listing_empty() {
        let listing = Response::listing(&[], b"", "localhost", 70);
        assert_eq!(&listing[..], b".");
    }
}
