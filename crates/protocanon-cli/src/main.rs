//! protocanon - Canonicalize Protocol Buffer wire-format payloads
//!
//! This tool rewrites protobuf-encoded files into their canonical wire form
//! and content-addresses them, so that payloads which differ only in field
//! order can be recognized as duplicates without a `.proto` schema.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protocanon_core::canonical::DEFAULT_MAX_DEPTH;
use protocanon_core::scanner::{decode_varint, zigzag_decode};
use protocanon_core::{parse_frame, CanonicalConfig, Canonicalizer, WireType};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Canonicalize Protocol Buffer wire-format payloads
#[derive(Parser, Debug)]
#[command(name = "protocanon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Write the result here instead of stdout (single file only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "digest")]
    format: OutputFormat,

    /// Deepest nesting level of embedded messages that is rewritten
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Overwrite an existing output file
    #[arg(long)]
    force: bool,

    /// Only list files whose canonical form matches another file (directory only)
    #[arg(long)]
    duplicates_only: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single payload file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of payload files to process recursively
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for canonicalized payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Canonical bytes, unmodified
    Raw,
    /// Canonical bytes as lowercase hex
    Hex,
    /// BLAKE3 digest of the canonical bytes
    Digest,
    /// Indented listing of the canonical fields
    Fields,
}

/// Groups files by the digest of their canonical form
#[derive(Default)]
struct DigestRegistry {
    /// Maps canonical digest -> files with that digest, in visit order
    seen: BTreeMap<String, Vec<PathBuf>>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total: usize,
    duplicates: usize,
}

impl DigestRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Full BLAKE3 hex digest of canonical bytes
    fn content_digest(canonical: &[u8]) -> String {
        blake3::hash(canonical).to_hex().to_string()
    }

    /// Records a file; returns true if its digest was already known
    fn register(&mut self, digest: &str, path: &Path) -> bool {
        self.stats.total += 1;

        let entries = self.seen.entry(digest.to_string()).or_default();
        let duplicate = !entries.is_empty();
        if duplicate {
            debug!(
                "{} duplicates {} (digest {})",
                path.display(),
                entries[0].display(),
                digest
            );
            self.stats.duplicates += 1;
        }
        entries.push(path.to_path_buf());

        duplicate
    }

    /// Digests shared by more than one file
    fn duplicate_groups(&self) -> impl Iterator<Item = (&String, &Vec<PathBuf>)> + '_ {
        self.seen.iter().filter(|(_, paths)| paths.len() > 1)
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} files, {} distinct, {} duplicates",
            self.stats.total,
            self.seen.len(),
            self.stats.duplicates
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
        .with_writer(std::io::stderr)
        .init();

    let canonicalizer =
        Canonicalizer::with_config(CanonicalConfig::new().max_depth(cli.max_depth));

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, &canonicalizer, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, &canonicalizer, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Canonicalize one file and emit it in the requested format
fn process_single_file(cli: &Cli, canonicalizer: &Canonicalizer, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }
    if cli.duplicates_only {
        bail!("--duplicates-only requires --directory");
    }

    let data =
        fs::read(file).with_context(|| format!("Failed to read input file: {}", file.display()))?;
    trace!("Read {} bytes from {}", data.len(), file.display());

    let canonical = canonicalizer.canonicalize(&data);
    if canonical == data {
        debug!("{} is already canonical or not a message", file.display());
    }

    let rendered = render(cli.format, &canonical);
    match &cli.output {
        Some(path) => {
            write_output_file(path, &rendered, cli.force)?;
            info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&rendered)
                .context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
    }

    Ok(())
}

/// Canonicalize every file below a directory and report duplicates
fn process_directory(cli: &Cli, canonicalizer: &Canonicalizer, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }
    if cli.format != OutputFormat::Digest {
        bail!("Only --format digest is supported with --directory");
    }
    if cli.output.is_some() {
        bail!("--output requires --file");
    }

    info!("Scanning directory: {}", directory.display());

    let registry = digest_directory(canonicalizer, directory)?;
    let mut stdout = std::io::stdout().lock();
    write_report(&registry, cli.duplicates_only, &mut stdout)?;
    stdout.flush().context("Failed to flush stdout")?;

    registry.print_summary();
    Ok(())
}

/// Writes `<digest>  <path>` per file, followed by the duplicate groups.
///
/// With `duplicates_only` the listing is limited to files that share their
/// digest with another file and the trailing group report is left out.
fn write_report(
    registry: &DigestRegistry,
    duplicates_only: bool,
    out: &mut impl Write,
) -> Result<()> {
    if duplicates_only {
        for (digest, paths) in registry.duplicate_groups() {
            for path in paths {
                writeln!(out, "{}  {}", digest, path.display())?;
            }
        }
        return Ok(());
    }

    for (digest, paths) in &registry.seen {
        for path in paths {
            writeln!(out, "{}  {}", digest, path.display())?;
        }
    }

    let groups: Vec<_> = registry.duplicate_groups().collect();
    writeln!(
        out,
        "\n{} files, {} distinct, {} duplicate groups",
        registry.stats.total,
        registry.seen.len(),
        groups.len()
    )?;
    for (digest, paths) in groups {
        writeln!(out, "duplicate {} ({} files)", digest, paths.len())?;
        for path in paths {
            writeln!(out, "  {}", path.display())?;
        }
    }

    Ok(())
}

/// Walks `directory` and registers the canonical digest of every visible file
fn digest_directory(canonicalizer: &Canonicalizer, directory: &Path) -> Result<DigestRegistry> {
    let mut registry = DigestRegistry::new();

    let mut entries: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && !is_hidden(p))
        .collect();
    entries.sort();

    for path in entries {
        match fs::read(&path) {
            Ok(data) => {
                let digest = DigestRegistry::content_digest(&canonicalizer.canonicalize(&data));
                registry.register(&digest, &path);
            }
            Err(e) => {
                // Log error but continue with other files
                warn!("Error reading {}: {}", path.display(), e);
            }
        }
    }

    Ok(registry)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Renders canonical bytes in the given output format
fn render(format: OutputFormat, canonical: &[u8]) -> Vec<u8> {
    match format {
        OutputFormat::Raw => canonical.to_vec(),
        OutputFormat::Hex => {
            let mut out = hex::encode(canonical);
            out.push('\n');
            out.into_bytes()
        }
        OutputFormat::Digest => {
            let mut out = DigestRegistry::content_digest(canonical);
            out.push('\n');
            out.into_bytes()
        }
        OutputFormat::Fields => {
            let mut out = String::new();
            describe_fields(canonical, 0, &mut out);
            out.into_bytes()
        }
    }
}

/// Writes one line per field, descending into length-delimited values that
/// parse as messages. Input that is not a message is shown as escaped bytes.
fn describe_fields(data: &[u8], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);

    let fields = match parse_frame(data) {
        Ok(fields) if !fields.is_empty() => fields,
        _ => {
            let _ = writeln!(out, "{}\"{}\"", indent, data.escape_ascii());
            return;
        }
    };

    for field in fields {
        let value = field.value();
        let _ = match field.wire_type() {
            WireType::Varint => {
                let raw = decode_varint(value).map(|(v, _)| v).unwrap_or_default();
                writeln!(
                    out,
                    "{}{}: varint {} (zigzag {})",
                    indent,
                    field.tag(),
                    raw,
                    zigzag_decode(raw)
                )
            }
            WireType::Fixed32 => {
                writeln!(out, "{}{}: fixed32 0x{}", indent, field.tag(), hex::encode(value))
            }
            WireType::Fixed64 => {
                writeln!(out, "{}{}: fixed64 0x{}", indent, field.tag(), hex::encode(value))
            }
            WireType::LengthDelimited => {
                match parse_frame(value) {
                    Ok(nested) if !nested.is_empty() => {
                        let _ = writeln!(out, "{}{}: message {{", indent, field.tag());
                        describe_fields(value, depth + 1, out);
                        writeln!(out, "{}}}", indent)
                    }
                    _ => writeln!(
                        out,
                        "{}{}: bytes \"{}\"",
                        indent,
                        field.tag(),
                        value.escape_ascii()
                    ),
                }
            }
        };
    }
}

/// Write output to disk, refusing to clobber an existing file unless forced
fn write_output_file(output_path: &Path, content: &[u8], force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Check if file exists
    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    fs::write(output_path, content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocanon_core::{canonical, Encoder};
    use tempfile::TempDir;

    fn sample(reversed: bool) -> Vec<u8> {
        let mut enc = Encoder::new();
        if reversed {
            enc.string(2, "oak").uint64(1, 7);
        } else {
            enc.uint64(1, 7).string(2, "oak");
        }
        enc.take().to_vec()
    }

    #[test]
    fn test_registry_detects_duplicates() {
        let mut registry = DigestRegistry::new();
        let canonicalizer = Canonicalizer::new();

        let a = DigestRegistry::content_digest(&canonicalizer.canonicalize(&sample(false)));
        let b = DigestRegistry::content_digest(&canonicalizer.canonicalize(&sample(true)));
        assert_eq!(a, b);

        assert!(!registry.register(&a, Path::new("a.bin")));
        assert!(registry.register(&b, Path::new("b.bin")));
        assert_eq!(registry.stats.total, 2);
        assert_eq!(registry.stats.duplicates, 1);
        assert_eq!(registry.duplicate_groups().count(), 1);
    }

    #[test]
    fn test_digest_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.bin"), sample(false)).unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested/b.bin"), sample(true)).unwrap();
        fs::write(temp_dir.path().join("c.bin"), b"not a message \xff").unwrap();
        fs::write(temp_dir.path().join(".hidden"), sample(true)).unwrap();

        let registry = digest_directory(&Canonicalizer::new(), temp_dir.path()).unwrap();
        assert_eq!(registry.stats.total, 3);
        assert_eq!(registry.seen.len(), 2);

        let groups: Vec<_> = registry.duplicate_groups().collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }

    fn duplicate_fixture() -> (TempDir, DigestRegistry) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.bin"), sample(false)).unwrap();
        fs::write(temp_dir.path().join("b.bin"), sample(true)).unwrap();
        fs::write(temp_dir.path().join("c.bin"), b"\xff").unwrap();
        let registry = digest_directory(&Canonicalizer::new(), temp_dir.path()).unwrap();
        (temp_dir, registry)
    }

    #[test]
    fn test_write_report_lists_every_file() {
        let (temp_dir, registry) = duplicate_fixture();
        let shared = DigestRegistry::content_digest(&canonical(&sample(false)));
        let opaque = DigestRegistry::content_digest(b"\xff");
        let path = |name: &str| temp_dir.path().join(name).display().to_string();

        let mut out = Vec::new();
        write_report(&registry, false, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        let mut listing = vec![
            format!("{}  {}", shared, path("a.bin")),
            format!("{}  {}", shared, path("b.bin")),
            format!("{}  {}", opaque, path("c.bin")),
        ];
        listing.sort();
        let expected = format!(
            "{}\n\n3 files, 2 distinct, 1 duplicate groups\nduplicate {} (2 files)\n  {}\n  {}\n",
            listing.join("\n"),
            shared,
            path("a.bin"),
            path("b.bin")
        );
        assert_eq!(report, expected);
    }

    #[test]
    fn test_write_report_duplicates_only() {
        let (temp_dir, registry) = duplicate_fixture();
        let shared = DigestRegistry::content_digest(&canonical(&sample(false)));
        let path = |name: &str| temp_dir.path().join(name).display().to_string();

        let mut out = Vec::new();
        write_report(&registry, true, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert_eq!(
            report,
            format!(
                "{}  {}\n{}  {}\n",
                shared,
                path("a.bin"),
                shared,
                path("b.bin")
            )
        );
    }

    #[test]
    fn test_content_digest() {
        let hash1 = DigestRegistry::content_digest(b"hello");
        let hash2 = DigestRegistry::content_digest(b"hello");
        let hash3 = DigestRegistry::content_digest(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_render_hex() {
        assert_eq!(render(OutputFormat::Hex, &[0x08, 0xAC, 0x02]), b"08ac02\n");
        assert_eq!(render(OutputFormat::Hex, &[]), b"\n");
        assert_eq!(render(OutputFormat::Raw, &[0x08, 0x01]), vec![0x08, 0x01]);
    }

    #[test]
    fn test_describe_fields() {
        let mut enc = Encoder::new();
        enc.uint64(1, 3).message(2, |m| {
            m.string(1, "oak");
        });
        let listing = String::from_utf8(render(OutputFormat::Fields, enc.encoding())).unwrap();
        assert_eq!(
            listing,
            "1: varint 3 (zigzag -2)\n2: message {\n  1: bytes \"oak\"\n}\n"
        );
    }

    #[test]
    fn test_describe_fixed_fields_as_hex() {
        let mut enc = Encoder::new();
        enc.float32(1, 1.0).float64(2, 1.0);
        let listing = String::from_utf8(render(OutputFormat::Fields, enc.encoding())).unwrap();
        assert_eq!(
            listing,
            "1: fixed32 0x0000803f\n2: fixed64 0x000000000000f03f\n"
        );
    }

    #[test]
    fn test_describe_opaque_input() {
        let listing = String::from_utf8(render(OutputFormat::Fields, b"\xff")).unwrap();
        assert_eq!(listing, "\"\\xff\"\n");
    }

    #[test]
    fn test_write_output_file_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/canonical.bin");

        write_output_file(&path, b"one", false).unwrap();
        assert!(write_output_file(&path, b"two", false).is_err());
        write_output_file(&path, b"two", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new("/tmp/.git")));
        assert!(!is_hidden(Path::new("/tmp/payload.bin")));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
