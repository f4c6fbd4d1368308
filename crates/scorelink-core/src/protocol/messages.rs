//! Tagged-text wire formats shared by discovery, file sync, and the score
//! channel.
//!
//! Wire format:
//! ```text
//! <getServer>display-01</getServer>            discovery request (UDP)
//! <serverIP>192.168.1.10,10.0.0.4</serverIP>   discovery reply (UDP)
//! <send_file_list>1</send_file_list>           manifest request (TCP)
//! <file_list>logo.png;8192,ad.jpg;100</file_list>   manifest reply, or: NoData
//! <get>logo.png,0,262144</get>                 chunk request (TCP)
//! ```
//!
//! Every message is a single UTF-8 string with one value bracketed by an
//! open/close tag pair. Absent or malformed tags are "no data", not errors —
//! the server ships whatever fields it has and the display ignores the rest.

use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Multicast group the discovery request is sent to.
pub const DISCOVERY_GROUP: &str = "224.0.0.1";

/// UDP port the server listens on for discovery requests.
pub const DISCOVERY_PORT: u16 = 45453;

/// TCP port of the score channel on a discovered server.
pub const SCORE_SERVICE_PORT: u16 = 45454;

/// TCP port of the logo media sync service.
pub const LOGO_SYNC_PORT: u16 = 45455;

/// TCP port of the slideshow media sync service.
pub const SLIDESHOW_SYNC_PORT: u16 = 45456;

/// Fixed manifest request sent immediately after connecting to a sync port.
pub const MANIFEST_REQUEST: &str = "<send_file_list>1</send_file_list>";

/// Manifest reply meaning the server has no files in this category.
pub const NO_DATA: &str = "NoData";

/// Errors produced while parsing protocol text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The expected open/close tag pair is absent from the message.
    #[error("missing <{0}> tag in protocol message")]
    MissingTag(&'static str),
}

// ── Tag helpers ───────────────────────────────────────────────────────────────

/// Returns the text between `<tag>` and `</tag>`, or `None` when either
/// marker is absent or they are out of order.
pub fn extract_tag<'a>(message: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = message.find(&open)? + open.len();
    let end = message[start..].find(&close)? + start;
    Some(&message[start..end])
}

/// Wraps `value` in an open/close tag pair.
pub fn wrap_tag(tag: &str, value: &str) -> String {
    format!("<{tag}>{value}</{tag}>")
}

// ── Discovery messages ────────────────────────────────────────────────────────

/// Builds the discovery datagram broadcast on every qualifying interface.
pub fn discovery_request(host_name: &str) -> String {
    wrap_tag("getServer", host_name)
}

/// Extracts the comma-separated server address list from a discovery reply.
///
/// Returns `None` when the `<serverIP>` tag is absent. Empty list entries
/// (trailing commas) are skipped; duplicates are preserved — deduplication is
/// a caller policy, not a protocol rule.
pub fn parse_discovery_reply(message: &str) -> Option<Vec<String>> {
    let list = extract_tag(message, "serverIP")?;
    Some(
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// A server address constructed from a discovery reply: one discovered IP
/// plus the fixed service port for whichever channel is being opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateEndpoint {
    /// Connection scheme used when rendering the endpoint as an address string.
    pub scheme: String,
    /// The IP (or host name) taken from the discovery reply.
    pub host: String,
    /// The fixed service port for the channel.
    pub port: u16,
}

impl CandidateEndpoint {
    /// Creates an endpoint with the default `tcp` scheme.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "tcp".to_string(),
            host: host.into(),
            port,
        }
    }

    /// The `{scheme}://{ip}:{port}` address string.
    pub fn address(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// The `host:port` form accepted by socket connect calls.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for CandidateEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address())
    }
}

// ── Manifest messages ─────────────────────────────────────────────────────────

/// One entry of a parsed manifest reply: a file the server offers, with the
/// byte size it declares. The set is rebuilt on every manifest response and
/// never persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileDescriptor {
    pub name: String,
    pub size: u64,
}

/// A parsed manifest reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestReply {
    /// The server has nothing in this category; the session closes cleanly.
    NoData,
    /// The server's file list, in reply order.
    Files(Vec<RemoteFileDescriptor>),
}

/// Parses a manifest reply: either the literal `NoData` or
/// `<file_list>name;size,name;size,...</file_list>`.
///
/// Entries that fail to parse (missing `;`, non-numeric size, empty name) are
/// skipped rather than failing the whole reply.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingTag`] when the reply is neither `NoData`
/// nor a bracketed file list.
pub fn parse_manifest_reply(message: &str) -> Result<ManifestReply, ProtocolError> {
    let trimmed = message.trim();
    if trimmed == NO_DATA {
        return Ok(ManifestReply::NoData);
    }

    let list = extract_tag(trimmed, "file_list").ok_or(ProtocolError::MissingTag("file_list"))?;

    let mut entries = Vec::new();
    for item in list.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match parse_manifest_entry(item) {
            Some(entry) => entries.push(entry),
            None => {
                tracing::warn!("skipping malformed manifest entry: {item:?}");
            }
        }
    }
    Ok(ManifestReply::Files(entries))
}

/// Parses a single `name;size` pair.
fn parse_manifest_entry(item: &str) -> Option<RemoteFileDescriptor> {
    let (name, size) = item.split_once(';')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let size = size.trim().parse::<u64>().ok()?;
    Some(RemoteFileDescriptor {
        name: name.to_string(),
        size,
    })
}

// ── Chunk request ─────────────────────────────────────────────────────────────

/// Builds the `<get>{filename},{offset},{chunkSize}</get>` request for one
/// bounded slice of a file. The offset always equals the byte count already
/// received for the file.
pub fn chunk_request(file_name: &str, offset: u64, chunk_size: u32) -> String {
    wrap_tag("get", &format!("{file_name},{offset},{chunk_size}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Tag helpers ──────────────────────────────────────────────────────────

    #[test]
    fn test_extract_tag_returns_inner_text() {
        assert_eq!(extract_tag("<a>hello</a>", "a"), Some("hello"));
    }

    #[test]
    fn test_extract_tag_returns_none_when_tag_absent() {
        assert_eq!(extract_tag("<b>hello</b>", "a"), None);
    }

    #[test]
    fn test_extract_tag_returns_none_when_close_missing() {
        assert_eq!(extract_tag("<a>hello", "a"), None);
    }

    #[test]
    fn test_extract_tag_empty_value() {
        assert_eq!(extract_tag("<a></a>", "a"), Some(""));
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    #[test]
    fn test_discovery_request_wraps_host_name() {
        assert_eq!(
            discovery_request("display-01"),
            "<getServer>display-01</getServer>"
        );
    }

    #[test]
    fn test_parse_discovery_reply_splits_addresses() {
        // Arrange
        let reply = "<serverIP>192.168.1.10,10.0.0.4</serverIP>";

        // Act
        let addrs = parse_discovery_reply(reply).unwrap();

        // Assert
        assert_eq!(addrs, vec!["192.168.1.10", "10.0.0.4"]);
    }

    #[test]
    fn test_parse_discovery_reply_preserves_duplicates() {
        let reply = "<serverIP>192.168.1.10,192.168.1.10</serverIP>";
        let addrs = parse_discovery_reply(reply).unwrap();
        assert_eq!(addrs.len(), 2, "duplicates are a caller policy, not ours");
    }

    #[test]
    fn test_parse_discovery_reply_skips_empty_entries() {
        let reply = "<serverIP>192.168.1.10,</serverIP>";
        let addrs = parse_discovery_reply(reply).unwrap();
        assert_eq!(addrs, vec!["192.168.1.10"]);
    }

    #[test]
    fn test_parse_discovery_reply_rejects_other_messages() {
        assert_eq!(parse_discovery_reply("<getServer>x</getServer>"), None);
    }

    #[test]
    fn test_candidate_endpoint_address_format() {
        let ep = CandidateEndpoint::new("192.168.1.10", SCORE_SERVICE_PORT);
        assert_eq!(ep.address(), "tcp://192.168.1.10:45454");
        assert_eq!(ep.authority(), "192.168.1.10:45454");
    }

    // ── Manifest ─────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_manifest_reply_no_data() {
        // The literal `NoData` reply parses as such, so the engine can close
        // cleanly with zero chunk requests.
        assert_eq!(parse_manifest_reply("NoData"), Ok(ManifestReply::NoData));
    }

    #[test]
    fn test_parse_manifest_reply_file_list() {
        // Arrange
        let reply = "<file_list>a.jpg;100,b.jpg;200</file_list>";

        // Act
        let parsed = parse_manifest_reply(reply).unwrap();

        // Assert
        assert_eq!(
            parsed,
            ManifestReply::Files(vec![
                RemoteFileDescriptor {
                    name: "a.jpg".to_string(),
                    size: 100
                },
                RemoteFileDescriptor {
                    name: "b.jpg".to_string(),
                    size: 200
                },
            ])
        );
    }

    #[test]
    fn test_parse_manifest_reply_empty_list() {
        let parsed = parse_manifest_reply("<file_list></file_list>").unwrap();
        assert_eq!(parsed, ManifestReply::Files(vec![]));
    }

    #[test]
    fn test_parse_manifest_reply_skips_malformed_entries() {
        // `bad` has no size and `c.png;x` a non-numeric one; both are skipped.
        let reply = "<file_list>a.jpg;100,bad,c.png;x</file_list>";
        let parsed = parse_manifest_reply(reply).unwrap();
        assert_eq!(
            parsed,
            ManifestReply::Files(vec![RemoteFileDescriptor {
                name: "a.jpg".to_string(),
                size: 100
            }])
        );
    }

    #[test]
    fn test_parse_manifest_reply_rejects_unknown_message() {
        let result = parse_manifest_reply("<something>1</something>");
        assert_eq!(result, Err(ProtocolError::MissingTag("file_list")));
    }

    // ── Chunk request ────────────────────────────────────────────────────────

    #[test]
    fn test_chunk_request_format() {
        assert_eq!(
            chunk_request("logo.png", 0, 262_144),
            "<get>logo.png,0,262144</get>"
        );
    }

    #[test]
    fn test_chunk_request_carries_offset() {
        assert_eq!(
            chunk_request("logo.png", 262_144, 262_144),
            "<get>logo.png,262144,262144</get>"
        );
    }
}
