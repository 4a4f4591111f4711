//! tagwire - Inspect and verify Protocol Buffers wire payloads
//!
//! This tool decodes raw protobuf payloads without a schema, prints their
//! field structure, and checks that the codec re-encodes them byte for byte.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tagwire_core::extension::ExtensionBuffer;
use tagwire_core::wire::varint::decode_zigzag64;
use tagwire_core::{message, SerializerRegistry, WireReader, WireType};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect and verify Protocol Buffers wire payloads
#[derive(Parser, Debug)]
#[command(name = "tagwire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Re-encode each payload and verify the bytes are unchanged
    #[arg(long)]
    check: bool,

    /// Deepest level at which length-delimited values are tried as messages
    #[arg(long, default_value = "16")]
    max_depth: usize,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single payload file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of payload files
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for decoded payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Every field, nested messages indented
    Tree,
    /// One line per payload
    Summary,
}

/// A payload decoded without a schema; every field is unknown
#[derive(Debug, Default)]
struct RawPayload {
    fields: ExtensionBuffer,
}

message!(RawPayload [extensions: fields] {});

/// One decoded field
#[derive(Debug, PartialEq)]
struct Field<'a> {
    number: u32,
    offset: usize,
    value: FieldValue<'a>,
}

#[derive(Debug, PartialEq)]
enum FieldValue<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Message(Vec<Field<'a>>),
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// Parses `data` as a sequence of fields.
///
/// Length-delimited values that read as printable UTF-8 are shown as text;
/// otherwise they are tried as nested messages up to `max_depth`.
fn parse_fields(data: &[u8], base: usize, depth: usize, max_depth: usize) -> tagwire_core::Result<Vec<Field<'_>>> {
    let mut reader = WireReader::new(data);
    let mut fields = Vec::new();

    while let Some(tag) = reader.read_tag()? {
        let offset = base + reader.position();
        let value = match tag.wire_type() {
            WireType::Varint => FieldValue::Varint(reader.read_varint()?),
            WireType::Fixed32 => FieldValue::Fixed32(reader.read_fixed32()?),
            WireType::Fixed64 => FieldValue::Fixed64(reader.read_fixed64()?),
            WireType::LengthDelimited => {
                let body = reader.read_length_delimited()?;
                let body_offset = base + reader.position() - body.len();
                classify(body, body_offset, depth, max_depth)
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(tagwire_core::Error::UnsupportedWireType {
                    wire_type: tag.wire_type(),
                    field: tag.field(),
                    offset,
                })
            }
        };
        fields.push(Field {
            number: tag.field(),
            offset,
            value,
        });
    }
    Ok(fields)
}

fn classify(body: &[u8], offset: usize, depth: usize, max_depth: usize) -> FieldValue<'_> {
    if let Ok(text) = std::str::from_utf8(body) {
        if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return FieldValue::Text(text);
        }
    }
    if depth < max_depth {
        if let Ok(fields) = parse_fields(body, offset, depth + 1, max_depth) {
            return FieldValue::Message(fields);
        }
    }
    FieldValue::Bytes(body)
}

/// Nesting depth of a parsed field list
fn nesting_depth(fields: &[Field<'_>]) -> usize {
    fields
        .iter()
        .map(|field| match &field.value {
            FieldValue::Message(children) => 1 + nesting_depth(children),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

fn render_tree(fields: &[Field<'_>], indent: usize, out: &mut String) {
    for field in fields {
        let pad = "  ".repeat(indent);
        let line = match &field.value {
            FieldValue::Varint(v) => {
                let sint = decode_zigzag64(*v);
                format!("{pad}{}: varint {} (sint {})", field.number, v, sint)
            }
            FieldValue::Fixed32(v) => {
                format!("{pad}{}: fixed32 {} (float {})", field.number, v, f32::from_bits(*v))
            }
            FieldValue::Fixed64(v) => {
                format!("{pad}{}: fixed64 {} (double {})", field.number, v, f64::from_bits(*v))
            }
            FieldValue::Message(children) => {
                format!("{pad}{}: message ({} fields) {{", field.number, children.len())
            }
            FieldValue::Text(text) => format!("{pad}{}: string {:?}", field.number, text),
            FieldValue::Bytes(bytes) => {
                format!("{pad}{}: bytes [{}] {}", field.number, bytes.len(), hex(bytes))
            }
        };
        out.push_str(&line);
        out.push('\n');

        if let FieldValue::Message(children) = &field.value {
            render_tree(children, indent + 1, out);
            out.push_str(&pad);
            out.push_str("}\n");
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Short digest used to report payload identity (first 8 hex chars of blake3)
fn short_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex()[..8].to_string()
}

/// Result of re-encoding a payload through the codec
#[derive(Debug, PartialEq, Eq)]
enum CheckOutcome {
    Identical,
    Changed { original: String, reencoded: String },
}

/// Decodes `data` as an all-unknown message and re-encodes it
fn round_trip_check(registry: &SerializerRegistry, data: &[u8]) -> tagwire_core::Result<CheckOutcome> {
    let payload: RawPayload = registry.deserialize(data)?;
    trace!("Captured {} unknown bytes", payload.fields.len());
    let reencoded = registry.serialize_to_vec(&payload)?;

    let original = blake3::hash(data);
    let again = blake3::hash(&reencoded);
    if original == again {
        Ok(CheckOutcome::Identical)
    } else {
        Ok(CheckOutcome::Changed {
            original: original.to_hex()[..8].to_string(),
            reencoded: again.to_hex()[..8].to_string(),
        })
    }
}

/// Tracks payloads already reported, by content digest
#[derive(Default)]
struct PayloadSet {
    /// Maps digest -> first path carrying it
    seen: HashMap<blake3::Hash, PathBuf>,
    stats: PayloadStats,
}

#[derive(Default, Debug)]
struct PayloadStats {
    total: usize,
    duplicates: usize,
    inspected: usize,
    decode_failures: usize,
    check_failures: usize,
}

impl PayloadSet {
    fn new() -> Self {
        Self::default()
    }

    /// Records `data` and returns the earlier path if identical content was seen
    fn register(&mut self, path: &Path, data: &[u8]) -> Option<PathBuf> {
        self.stats.total += 1;
        let digest = blake3::hash(data);
        if let Some(first) = self.seen.get(&digest) {
            debug!("Skipping duplicate: {} (same as {})", path.display(), first.display());
            self.stats.duplicates += 1;
            return Some(first.clone());
        }
        self.seen.insert(digest, path.to_path_buf());
        None
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} found, {} duplicates skipped, {} inspected, {} failed to decode, {} failed the check",
            self.stats.total,
            self.stats.duplicates,
            self.stats.inspected,
            self.stats.decode_failures,
            self.stats.check_failures
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let registry = SerializerRegistry::global();
    let mut payloads = PayloadSet::new();

    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, registry, file, &mut payloads)?;
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, registry, directory, &mut payloads)?;
    } else {
        bail!("Either --file or --directory must be specified")
    }

    payloads.print_summary();
    if cli.check && payloads.stats.check_failures > 0 {
        bail!(
            "{} payload(s) did not survive the round-trip check",
            payloads.stats.check_failures
        );
    }
    Ok(())
}

/// Process a single payload file
fn process_single_file(
    cli: &Cli,
    registry: &SerializerRegistry,
    file: &Path,
    payloads: &mut PayloadSet,
) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }
    let report = process_payload(cli, registry, file, payloads)?;
    print!("{report}");
    Ok(())
}

/// Process a directory of payloads recursively
fn process_directory(
    cli: &Cli,
    registry: &SerializerRegistry,
    directory: &Path,
    payloads: &mut PayloadSet,
) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut entries: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file() && !is_hidden(path))
        .collect();
    entries.sort();

    for path in &entries {
        match process_payload(cli, registry, path, payloads) {
            Ok(report) => print!("{report}"),
            // Log error but continue with other files
            Err(e) => warn!("Error processing {}: {:#}", path.display(), e),
        }
    }

    info!("Processed {} files", entries.len());
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Decodes one payload and returns the text to print for it
fn process_payload(
    cli: &Cli,
    registry: &SerializerRegistry,
    path: &Path,
    payloads: &mut PayloadSet,
) -> Result<String> {
    trace!("Reading {}", path.display());
    let data = fs::read(path).with_context(|| format!("Failed to read payload: {}", path.display()))?;

    if let Some(first) = payloads.register(path, &data) {
        return Ok(format!(
            "{}: identical to {}\n",
            path.display(),
            first.display()
        ));
    }
    payloads.stats.inspected += 1;

    let fields = match parse_fields(&data, 0, 0, cli.max_depth) {
        Ok(fields) => fields,
        Err(e) => {
            payloads.stats.decode_failures += 1;
            if cli.check {
                payloads.stats.check_failures += 1;
            }
            return Err(e).with_context(|| format!("Failed to decode payload: {}", path.display()));
        }
    };

    let mut out = String::new();
    match cli.format {
        OutputFormat::Tree => {
            out.push_str(&format!("{} ({} bytes)\n", path.display(), data.len()));
            render_tree(&fields, 1, &mut out);
        }
        OutputFormat::Summary => {
            out.push_str(&format!(
                "{}: {} bytes, {} top-level fields, depth {}, digest {}\n",
                path.display(),
                data.len(),
                fields.len(),
                nesting_depth(&fields),
                short_digest(&data)
            ));
        }
    }

    if cli.check {
        match round_trip_check(registry, &data) {
            Ok(CheckOutcome::Identical) => out.push_str("  check: ok\n"),
            Ok(CheckOutcome::Changed {
                original,
                reencoded,
            }) => {
                payloads.stats.check_failures += 1;
                out.push_str(&format!("  check: FAILED ({original} -> {reencoded})\n"));
            }
            Err(e) => {
                payloads.stats.check_failures += 1;
                out.push_str(&format!("  check: FAILED ({e})\n"));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    // { 1: 150, 2: "hi", 3: { 1: -1 as sint }, 4: fixed32 1.0f }
    const SAMPLE: &[u8] = &[
        0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i', 0x1A, 0x02, 0x08, 0x01, 0x25, 0x00, 0x00, 0x80,
        0x3F,
    ];

    fn cli(format: OutputFormat, check: bool) -> Cli {
        Cli {
            input: InputMode {
                file: None,
                directory: None,
            },
            verbose: 0,
            format,
            check,
            max_depth: 16,
        }
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(SAMPLE, 0, 0, 16).unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].value, FieldValue::Varint(150));
        assert_eq!(fields[1].value, FieldValue::Text("hi"));
        assert_eq!(
            fields[2].value,
            FieldValue::Message(vec![Field {
                number: 1,
                offset: 10,
                value: FieldValue::Varint(1)
            }])
        );
        assert_eq!(fields[3].value, FieldValue::Fixed32(0x3F80_0000));
        assert_eq!(nesting_depth(&fields), 1);
    }

    #[test]
    fn test_max_depth_stops_nesting() {
        let fields = parse_fields(SAMPLE, 0, 0, 0).unwrap();
        assert_eq!(fields[2].value, FieldValue::Bytes(&[0x08, 0x01]));
    }

    #[test]
    fn test_whitespace_in_strings_is_text() {
        let data = [0x12, 0x05, b'a', b'\t', b'b', b'\n', b'c'];
        let fields = parse_fields(&data, 0, 0, 16).unwrap();
        assert_eq!(fields[0].value, FieldValue::Text("a\tb\nc"));

        // other control characters still rule out text
        let data = [0x12, 0x02, b'a', 0x07];
        let fields = parse_fields(&data, 0, 0, 16).unwrap();
        assert_eq!(fields[0].value, FieldValue::Bytes(&[b'a', 0x07]));
    }

    #[test]
    fn test_groups_are_rejected() {
        assert!(parse_fields(&[0x0B, 0x0C], 0, 0, 16).is_err());
    }

    #[test]
    fn test_render_tree() {
        let fields = parse_fields(SAMPLE, 0, 0, 16).unwrap();
        let mut out = String::new();
        render_tree(&fields, 0, &mut out);
        assert_eq!(
            out,
            "1: varint 150 (sint 75)\n\
             2: string \"hi\"\n\
             3: message (1 fields) {\n  \
             1: varint 1 (sint -1)\n\
             }\n\
             4: fixed32 1065353216 (float 1)\n"
        );
    }

    #[test]
    fn test_round_trip_check() {
        let registry = SerializerRegistry::new();
        assert_eq!(
            round_trip_check(&registry, SAMPLE).unwrap(),
            CheckOutcome::Identical
        );
        assert!(round_trip_check(&registry, &[0x0B, 0x0C]).is_err());
    }

    #[test]
    fn test_short_digest() {
        let a = short_digest(b"hello");
        assert_eq!(a, short_digest(b"hello"));
        assert_ne!(a, short_digest(b"world"));
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_directory_duplicates_reported_once() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.bin"), SAMPLE).unwrap();
        fs::write(temp_dir.path().join("b.bin"), SAMPLE).unwrap();
        fs::write(temp_dir.path().join("c.bin"), [0x08, 0x01]).unwrap();
        fs::write(temp_dir.path().join(".hidden"), [0x08, 0x02]).unwrap();

        let registry = SerializerRegistry::new();
        let cli = cli(OutputFormat::Summary, true);
        let mut payloads = PayloadSet::new();
        process_directory(&cli, &registry, temp_dir.path(), &mut payloads).unwrap();

        assert_eq!(payloads.stats.total, 3);
        assert_eq!(payloads.stats.duplicates, 1);
        assert_eq!(payloads.stats.inspected, 2);
        assert_eq!(payloads.stats.check_failures, 0);
    }

    #[test]
    fn test_process_payload_summary() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.bin");
        fs::write(&path, SAMPLE).unwrap();

        let registry = SerializerRegistry::new();
        let mut payloads = PayloadSet::new();
        let report = process_payload(&cli(OutputFormat::Summary, true), &registry, &path, &mut payloads).unwrap();
        assert!(report.contains("16 bytes, 4 top-level fields, depth 1"));
        assert!(report.contains("check: ok"));
    }

    #[test]
    fn test_undecodable_payload_counts_as_check_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.bin");
        fs::write(&path, [0x08]).unwrap();

        let registry = SerializerRegistry::new();
        let mut payloads = PayloadSet::new();
        assert!(process_payload(&cli(OutputFormat::Tree, true), &registry, &path, &mut payloads).is_err());
        assert_eq!(payloads.stats.decode_failures, 1);
        assert_eq!(payloads.stats.check_failures, 1);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
