//! Human-readable rendering of registry entries.
//!
//! Used by the on-demand dump and by the exit-time leak report. Rendering is
//! pure formatting over an entry snapshot; collecting the snapshot is the
//! registry's job.

use std::fmt::{self, Write};

use crate::entry::AllocationEntry;

/// Write one line block per entry.
///
/// With `detailed` set (diagnostic mode) the allocation, resize, and release
/// call sites are included; otherwise only address, size, and live/released
/// status are shown.
pub fn write_entries(
    out: &mut impl Write,
    entries: &[AllocationEntry],
    detailed: bool,
) -> fmt::Result {
    writeln!(out, "tracked entries: {}", entries.len())?;
    for entry in entries {
        write_entry(out, entry, detailed)?;
    }
    Ok(())
}

fn write_entry(out: &mut impl Write, entry: &AllocationEntry, detailed: bool) -> fmt::Result {
    writeln!(
        out,
        "  {:#x}  {} bytes  {}",
        entry.address,
        entry.size,
        if entry.is_released { "released" } else { "live" }
    )?;
    if !detailed {
        return Ok(());
    }
    writeln!(out, "    allocated at {}", entry.allocated_at)?;
    if let Some(site) = entry.last_resized_at {
        writeln!(out, "    last resized at {site}")?;
    }
    if let Some(site) = entry.released_at {
        writeln!(out, "    released at {site}")?;
    }
    Ok(())
}

/// Render a single leak line for the exit audit.
#[must_use]
pub fn leak_line(entry: &AllocationEntry) -> String {
    let mut line = format!(
        "leaked allocation: {:#x}, {} bytes, allocated at {}",
        entry.address, entry.size, entry.allocated_at
    );
    if let Some(site) = entry.last_resized_at {
        let _ = write!(line, ", last resized at {site}");
    }
    line
}
