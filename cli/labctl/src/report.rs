//! Plain-text fleet report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use labfleet_reconcile::FleetIndex;

/// Report file name inside the output directory.
pub const VMS_FILE: &str = "vms.txt";

/// Render `login<TAB>ip,ip` lines, one per student with at least one VM.
pub fn render_vms(index: &FleetIndex) -> String {
    let mut out = String::new();
    for (student, vms) in index.iter() {
        if vms.is_empty() {
            continue;
        }
        let addresses = vms
            .iter()
            .map(|vm| vm.address.to_string())
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("{}\t{}\n", student, addresses));
    }
    out
}

/// Write the report into `output_dir`, returning the file path.
pub fn write_vms(index: &FleetIndex, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    let path = output_dir.join(VMS_FILE);
    fs::write(&path, render_vms(index)).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}
