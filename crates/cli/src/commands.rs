use anyhow::{Context, Result};
use bundle::{Bundle, BundleReader, BundleWriter};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn pack(output: &Path, manifests: &[PathBuf], sync: bool) -> Result<()> {
    debug!(manifests = manifests.len(), sync, "packing bundle");
    let summary = BundleWriter::new()
        .sync(sync)
        .write(output, manifests)
        .with_context(|| format!("failed to pack {}", output.display()))?;

    println!(
        "{}: {} assets, {} dependencies, {} files, {} bytes",
        output.display(),
        summary.assets,
        summary.dependencies,
        summary.files,
        summary.total_bytes
    );
    Ok(())
}

fn open(path: &Path, preload: bool) -> Result<Bundle> {
    BundleReader::open(path, preload).with_context(|| format!("failed to open {}", path.display()))
}

/// Writes one line per asset, sorted by identifier, followed by its
/// dependencies and files.
pub fn list(path: &Path, preload: bool, out: &mut impl Write) -> Result<()> {
    let bundle = open(path, preload)?;

    let mut assets: Vec<_> = bundle.assets().collect();
    assets.sort_by(|a, b| a.id.cmp(&b.id));

    for asset in assets {
        let mut flags = Vec::new();
        if asset.flags.is_preload() {
            flags.push("preload");
        }
        if asset.flags.is_static() {
            flags.push("static");
        }
        writeln!(out, "{} [{}]", asset.id, flags.join(","))?;
        for dep in &asset.dependencies {
            writeln!(out, "  dep  {} ({})", dep.id, dep.name)?;
        }
        for file in &asset.files {
            writeln!(out, "  file {} {} bytes", file.name(), file.len())?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes the files of asset `id` to `out`, back to back in pack order.
pub fn cat(path: &Path, id: &str, preload: bool, out: &mut impl Write) -> Result<()> {
    let bundle = open(path, preload)?;
    let files = bundle.get_files(id)?;

    if bundle.is_cached() {
        for file in files {
            out.write_all(&file.read_all()?)?;
        }
    } else {
        // one scratch buffer for every file
        let mut buf = vec![0u8; files.iter().map(|f| f.len()).max().unwrap_or(0)];
        for file in files {
            let n = file
                .read_into(&mut buf)
                .with_context(|| format!("failed to read {}", file.name()))?;
            out.write_all(&buf[..n])?;
        }
    }
    out.flush()?;
    Ok(())
}
