use crate::sector::ranges_overlap;
use std::fmt::Write;

/// One row of the MBR partition table, in 512-byte sector units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Partition number on the device (1 = boot, 2 = root).
    pub num: u32,
    /// First sector occupied by the partition.
    pub start: u64,
    /// Length of the partition in sectors.
    pub size: u64,
    /// MBR type code as reported by the dump (`c`, `83`, ...).
    pub type_code: String,
    /// Whether the bootable flag is set.
    pub bootable: bool,
}

impl PartitionEntry {
    /// The last sector occupied by the partition.
    pub fn end(&self) -> u64 { self.start + self.size - 1 }
}

/// The two-entry partition table of a boot + root image, parsed from an
/// sfdisk-style sector-unit dump. The dump is re-read after every structural
/// change; this type is never cached across a table rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub boot: PartitionEntry,
    pub root: PartitionEntry,
    /// Disk identifier from the dump, preserved across rewrites.
    pub label_id: Option<String>,
}

/// Raised when a partition table dump cannot be interpreted as a valid
/// two-partition layout.
#[derive(Debug, Fail, PartialEq, Eq, Clone)]
pub enum TableParseError {
    #[fail(display = "partition {} is missing from the table dump", num)]
    MissingEntry { num: u32 },
    #[fail(display = "unexpected partition {} in the table dump (exactly two are supported)", num)]
    ExtraEntry { num: u32 },
    #[fail(display = "invalid value for {}: '{}'", field, value)]
    InvalidField { field: &'static str, value: String },
    #[fail(display = "unsupported partition table label '{}' (only dos is supported)", label)]
    UnsupportedLabel { label: String },
    #[fail(display = "boot and root partitions both start at sector {}", sector)]
    DegenerateTable { sector: u64 },
    #[fail(display = "root partition starts before the boot partition")]
    OutOfOrder,
    #[fail(display = "boot and root partitions overlap")]
    Overlapping,
}

impl PartitionTable {
    /// Parses an `sfdisk --dump` of a two-partition DOS disk.
    ///
    /// Filesystem types are not validated here; that check belongs to the
    /// planner, which has the probe results in hand.
    pub fn parse(dump: &str) -> Result<PartitionTable, TableParseError> {
        let mut label_id = None;
        let mut entries: Vec<PartitionEntry> = Vec::with_capacity(2);

        for line in dump.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(label) = strip_header(line, "label:") {
                if label != "dos" {
                    return Err(TableParseError::UnsupportedLabel { label: label.into() });
                }
                continue;
            }

            if let Some(id) = strip_header(line, "label-id:") {
                label_id = Some(id.into());
                continue;
            }

            if line.starts_with("device:")
                || line.starts_with("unit:")
                || line.starts_with("sector-size:")
            {
                continue;
            }

            if let Some(colon) = line.find(':') {
                let (device, fields) = line.split_at(colon);
                let entry = parse_entry(device.trim(), &fields[1..])?;
                if entries.len() == 2 {
                    return Err(TableParseError::ExtraEntry { num: entry.num });
                }
                entries.push(entry);
            }
        }

        let mut entries = entries.into_iter();
        let boot = entries.next().ok_or(TableParseError::MissingEntry { num: 1 })?;
        let root = entries.next().ok_or(TableParseError::MissingEntry { num: 2 })?;

        if boot.start == root.start {
            return Err(TableParseError::DegenerateTable { sector: boot.start });
        }

        if root.start < boot.start {
            return Err(TableParseError::OutOfOrder);
        }

        if ranges_overlap(boot.start, boot.end(), root.start, root.end()) {
            return Err(TableParseError::Overlapping);
        }

        Ok(PartitionTable { boot, root, label_id })
    }

    /// Renders the sfdisk input script which recreates this table.
    pub fn to_script(&self) -> String {
        let mut script = String::from("label: dos\n");
        if let Some(ref id) = self.label_id {
            let _ = writeln!(script, "label-id: {}", id);
        }
        script.push_str("unit: sectors\n\n");

        for entry in &[&self.boot, &self.root] {
            let _ = write!(
                script,
                "start={}, size={}, type={}",
                entry.start, entry.size, entry.type_code
            );
            if entry.bootable {
                script.push_str(", bootable");
            }
            script.push('\n');
        }

        script
    }

    /// The last sector occupied by any partition in the table.
    pub fn last_used_sector(&self) -> u64 { self.boot.end().max(self.root.end()) }
}

fn strip_header<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    if line.starts_with(header) {
        Some(line[header.len()..].trim())
    } else {
        None
    }
}

fn parse_entry(device: &str, fields: &str) -> Result<PartitionEntry, TableParseError> {
    let digits = device.trim_end_matches(|c: char| !c.is_ascii_digit()).len();
    let num_start = device[..digits].rfind(|c: char| !c.is_ascii_digit()).map_or(0, |i| i + 1);
    let num = device[num_start..digits]
        .parse::<u32>()
        .map_err(|_| TableParseError::InvalidField { field: "device", value: device.into() })?;

    let mut start = None;
    let mut size = None;
    let mut type_code = None;
    let mut bootable = false;

    for field in fields.split(',') {
        let field = field.trim();
        if field == "bootable" {
            bootable = true;
        } else if let Some(value) = strip_header(field, "start=") {
            start = Some(parse_sectors("start", value)?);
        } else if let Some(value) = strip_header(field, "size=") {
            size = Some(parse_sectors("size", value)?);
        } else if let Some(value) = strip_header(field, "type=") {
            type_code = Some(value.to_owned());
        }
    }

    let start =
        start.ok_or(TableParseError::InvalidField { field: "start", value: fields.into() })?;
    let size = size.ok_or(TableParseError::InvalidField { field: "size", value: fields.into() })?;
    let type_code = type_code.unwrap_or_else(|| "83".into());

    Ok(PartitionEntry { num, start, size, type_code, bootable })
}

fn parse_sectors(field: &'static str, value: &str) -> Result<u64, TableParseError> {
    match value.parse::<u64>() {
        Ok(sectors) if sectors > 0 => Ok(sectors),
        _ => Err(TableParseError::InvalidField { field, value: value.into() }),
    }
}
