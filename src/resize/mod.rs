use crate::errors::ResizeError;
use crate::plan::{self, ImageSizeChange, TailAdjustment};
use crate::sizing::{self, SizeAdjustment};
use crate::toolchain::{DeviceMap, Toolchain};
use imgresize_part_ops as part_ops;
use part_types::{
    bytes_to_sectors, FileSystem, FilesystemUsage, PartitionTable, SizeSpec, SECTOR_SIZE,
};
use proc_mounts::MountList;
use std::{
    fmt,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
};
use tempdir::TempDir;

/// The phases of a resize operation, in execution order. A failure halts
/// the machine wherever it stands; the only work performed afterwards is
/// detaching the device mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    ImageSized,
    TableRead,
    Planned,
    Shrinking,
    Relocating,
    TableRewritten,
    BootRebuilt,
    AutoAdjusted,
    Verified,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Step::Init => "initialization",
            Step::ImageSized => "image sizing",
            Step::TableRead => "table read",
            Step::Planned => "planning",
            Step::Shrinking => "root shrink",
            Step::Relocating => "relocation",
            Step::TableRewritten => "table rewrite",
            Step::BootRebuilt => "boot rebuild",
            Step::AutoAdjusted => "auto adjust",
            Step::Verified => "verification",
            Step::Done => "done",
        })
    }
}

/// What the caller wants done to an image.
#[derive(Debug, Clone)]
pub struct ResizeRequest {
    pub image: PathBuf,
    /// Target size for the boot partition.
    pub boot_size: Option<SizeSpec>,
    /// Target size for the image as a whole.
    pub image_size: Option<SizeSpec>,
    /// Overrides the preserved boot volume label.
    pub boot_label: Option<String>,
}

/// Sequences a full resize operation: image sizing, layout planning, root
/// shrink and relocation, boot rebuild, post-resize auto-adjustment, and
/// final verification. Holds exclusive access to one image for the
/// lifetime of one `run` call.
pub struct Resizer<'a, T: Toolchain, M: DeviceMap> {
    toolchain: &'a T,
    mapper: &'a M,
    step: Step,
    progress: Option<Box<dyn FnMut(u64, u64) + 'a>>,
}

impl<'a, T: Toolchain, M: DeviceMap> Resizer<'a, T, M> {
    pub fn new(toolchain: &'a T, mapper: &'a M) -> Self {
        Resizer { toolchain, mapper, step: Step::Init, progress: None }
    }

    /// Registers a callback fired with `(copied, total)` sector counts
    /// while root partition data is being relocated.
    pub fn on_relocation_progress<F: FnMut(u64, u64) + 'a>(&mut self, callback: F) {
        self.progress = Some(Box::new(callback));
    }

    /// The phase the machine stands in; after a failed run this names the
    /// phase that failed.
    pub fn step(&self) -> Step { self.step }

    fn enter(&mut self, step: Step) {
        unsafe {
            libc::sync();
        }
        self.step = step;
        info!("starting {} step", step);
    }

    pub fn run(&mut self, request: &ResizeRequest) -> Result<(), ResizeError> {
        self.enter(Step::Init);

        if request.boot_size.is_none() && request.image_size.is_none() {
            info!("no size change requested; image left untouched");
            self.step = Step::Done;
            return Ok(());
        }

        if !request.image.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("image not found at {}", request.image.display()),
            )
            .into());
        }

        let image_change = self.adjust_image_size(request)?;

        let device =
            self.mapper.attach(&request.image).map_err(|why| ResizeError::DeviceMap { why })?;
        let result = self.run_attached(request, &device, image_change);

        // Cleanup runs regardless of the outcome above.
        if let Err(why) = self.mapper.detach(&device) {
            error!("failed to detach {}: {}", device.display(), why);
            return result.and(Err(ResizeError::DeviceMap { why }));
        }

        result.map(|_| {
            self.step = Step::Done;
            info!("resize of {} complete", request.image.display());
        })
    }

    /// Validates and applies an image-level size change before the device
    /// is attached. The table is read from the image file itself so a
    /// shrink can be refused before any mutation.
    fn adjust_image_size(
        &mut self,
        request: &ResizeRequest,
    ) -> Result<Option<ImageSizeChange>, ResizeError> {
        let target = match request.image_size {
            Some(target) => target,
            None => return Ok(None),
        };

        self.enter(Step::ImageSized);
        let current = std::fs::metadata(&request.image)?.len();
        let dump = self.toolchain.read_table(&request.image)?;
        let table = PartitionTable::parse(&dump)?;

        match sizing::plan_image_size(current, target, &table)? {
            SizeAdjustment::Unchanged => {
                info!("image is already {} bytes", current);
                Ok(None)
            }
            SizeAdjustment::Expand { bytes } => {
                let parent = request.image.parent().unwrap_or_else(|| Path::new("."));
                let available = self.toolchain.host_free_space(parent)?;
                sizing::ensure_host_space(available, current, bytes)?;
                self.truncate_image(&request.image, bytes)?;
                Ok(Some(ImageSizeChange::Expanded))
            }
            SizeAdjustment::Shrink { bytes } => {
                self.truncate_image(&request.image, bytes)?;
                Ok(Some(ImageSizeChange::Shrunk))
            }
        }
    }

    fn truncate_image(&self, image: &Path, bytes: u64) -> Result<(), ResizeError> {
        info!("resizing image file {} to {} bytes", image.display(), bytes);
        let file = OpenOptions::new().write(true).open(image)?;
        file.set_len(bytes)?;
        Ok(())
    }

    fn run_attached(
        &mut self,
        request: &ResizeRequest,
        device: &Path,
        image_change: Option<ImageSizeChange>,
    ) -> Result<(), ResizeError> {
        self.ensure_unmounted(device)?;

        self.enter(Step::TableRead);
        let dump = self.toolchain.read_table(device)?;
        let mut table = PartitionTable::parse(&dump)?;
        let disk_sectors = self.toolchain.disk_sectors(device)?;

        let boot_part = self.mapper.partition_path(device, 1);
        let root_part = self.mapper.partition_path(device, 2);
        let boot_fs = self.toolchain.probe_filesystem(&boot_part);
        let root_fs = self.toolchain.probe_filesystem(&root_part);

        // Usage is snapshotted once, before any shrink decision. A root
        // that is not ext4 cannot be shrunk anyway, and the planner refuses
        // it before consulting the snapshot.
        let usage = if root_fs == Some(FileSystem::Ext4) {
            self.toolchain.filesystem_usage(&root_part)?
        } else {
            FilesystemUsage::default()
        };

        if let Some(boot_size) = request.boot_size {
            table = self.resize_boot(
                request,
                device,
                table,
                disk_sectors,
                boot_size,
                boot_fs,
                root_fs,
                &usage,
            )?;
        }

        if let Some(change) = image_change {
            self.auto_adjust(device, &mut table, disk_sectors, change, root_fs, &usage)?;
        }

        self.verify(device)
    }

    /// Applies a boot partition resize: plan, optional root shrink,
    /// optional relocation, table rewrite, and boot filesystem rebuild.
    #[allow(clippy::too_many_arguments)]
    fn resize_boot(
        &mut self,
        request: &ResizeRequest,
        device: &Path,
        mut table: PartitionTable,
        disk_sectors: u64,
        boot_size: SizeSpec,
        boot_fs: Option<FileSystem>,
        root_fs: Option<FileSystem>,
        usage: &FilesystemUsage,
    ) -> Result<PartitionTable, ResizeError> {
        self.enter(Step::Planned);
        let boot_size_sectors = bytes_to_sectors(boot_size.as_bytes())?;
        let plan =
            plan::plan_boot_resize(&table, boot_size_sectors, disk_sectors, boot_fs, root_fs, usage)?;
        info!(
            "planned boot resize: move: {}, shrink: {}, boot: {}-{}, root: {}-{}",
            plan.needs_move,
            plan.needs_shrink,
            plan.new_boot.start,
            plan.new_boot.end,
            plan.new_root.start,
            plan.new_root.end
        );

        // Stage the boot files and remember the label before anything on
        // disk changes; the boot filesystem is recreated from scratch.
        let stash = TempDir::new("imgresize-boot")?;
        let boot_part = self.mapper.partition_path(device, 1);
        let label =
            request.boot_label.clone().or_else(|| self.toolchain.filesystem_label(&boot_part));
        self.toolchain.backup_boot_files(&boot_part, stash.path())?;

        if plan.needs_shrink {
            self.enter(Step::Shrinking);
            let root_part = self.mapper.partition_path(device, 2);
            self.toolchain
                .fsck(&root_part, FileSystem::Ext4)
                .map_err(|why| ResizeError::FilesystemCheckFailed { part: root_part.clone(), why })?;
            self.toolchain
                .resize_filesystem(&root_part, Some(plan.new_root.sectors()))
                .map_err(|why| ResizeError::FilesystemResizeFailed { part: root_part, why })?;

            // Commit the shrunk size at the old location; this table is
            // valid on its own should anything later fail.
            table.root.size = plan.new_root.sectors();
            self.rewrite_table(device, &table)?;
        }

        if plan.needs_move {
            self.enter(Step::Relocating);
            let coords = part_ops::OffsetCoordinates {
                skip: table.root.start,
                offset: plan.new_root.start as i64 - table.root.start as i64,
                length: plan.new_root.sectors(),
            };

            {
                let progress = &mut self.progress;
                part_ops::move_partition(device, coords, SECTOR_SIZE, |copied, total| {
                    if let Some(callback) = progress.as_mut() {
                        callback(copied, total);
                    }
                })?;
            }

            // Only now that every sector has arrived is the new layout
            // committed.
            self.enter(Step::TableRewritten);
            table.boot.size = plan.new_boot.sectors();
            table.root.start = plan.new_root.start;
            table.root.size = plan.new_root.sectors();
            self.rewrite_table(device, &table)?;

            let root_part = self.mapper.partition_path(device, 2);
            self.toolchain
                .fsck(&root_part, FileSystem::Ext4)
                .map_err(|why| ResizeError::FilesystemCheckFailed { part: root_part, why })?;
        } else {
            self.enter(Step::TableRewritten);
            table.boot.size = plan.new_boot.sectors();
            self.rewrite_table(device, &table)?;
        }

        self.enter(Step::BootRebuilt);
        let boot_part = self.mapper.partition_path(device, 1);
        self.toolchain
            .format_boot(&boot_part, label.as_deref())
            .map_err(|why| ResizeError::FormatFailed { part: boot_part.clone(), why })?;
        self.toolchain.restore_boot_files(stash.path(), &boot_part)?;

        Ok(table)
    }

    /// After an image-level size change, grows or shrinks the root
    /// partition to track the new disk end.
    fn auto_adjust(
        &mut self,
        device: &Path,
        table: &mut PartitionTable,
        disk_sectors: u64,
        change: ImageSizeChange,
        root_fs: Option<FileSystem>,
        usage: &FilesystemUsage,
    ) -> Result<(), ResizeError> {
        self.enter(Step::AutoAdjusted);

        let adjustment = match plan::plan_tail_adjust(table, disk_sectors, change, usage)? {
            Some(adjustment) => adjustment,
            None => {
                info!("root partition already fits the image; no adjustment needed");
                return Ok(());
            }
        };

        if root_fs != Some(FileSystem::Ext4) {
            return Err(ResizeError::UnsupportedFilesystem {
                fs: root_fs.map_or_else(|| "unknown".to_owned(), |fs| fs.to_string()),
            });
        }

        let root_part = self.mapper.partition_path(device, 2);
        match adjustment {
            TailAdjustment::Grow { size_sectors } => {
                info!("growing root partition to {} sectors", size_sectors);
                table.root.size = size_sectors;
                self.rewrite_table(device, table)?;

                let root_part = self.mapper.partition_path(device, 2);
                self.toolchain.fsck(&root_part, FileSystem::Ext4).map_err(|why| {
                    ResizeError::FilesystemCheckFailed { part: root_part.clone(), why }
                })?;
                self.toolchain
                    .resize_filesystem(&root_part, None)
                    .map_err(|why| ResizeError::FilesystemResizeFailed { part: root_part, why })?;
            }
            TailAdjustment::Shrink { size_sectors } => {
                info!("shrinking root partition to {} sectors", size_sectors);
                self.toolchain.fsck(&root_part, FileSystem::Ext4).map_err(|why| {
                    ResizeError::FilesystemCheckFailed { part: root_part.clone(), why }
                })?;
                self.toolchain
                    .resize_filesystem(&root_part, Some(size_sectors))
                    .map_err(|why| ResizeError::FilesystemResizeFailed { part: root_part, why })?;

                table.root.size = size_sectors;
                self.rewrite_table(device, table)?;
            }
        }

        Ok(())
    }

    /// Final sanity pass: both filesystems must probe and check clean.
    fn verify(&mut self, device: &Path) -> Result<(), ResizeError> {
        self.enter(Step::Verified);

        let boot_part = self.mapper.partition_path(device, 1);
        match self.toolchain.probe_filesystem(&boot_part) {
            Some(fs) => self
                .toolchain
                .fsck(&boot_part, fs)
                .map_err(|why| ResizeError::FilesystemCheckFailed { part: boot_part, why })?,
            None => warn!("boot partition has no recognizable filesystem signature"),
        }

        let root_part = self.mapper.partition_path(device, 2);
        match self.toolchain.probe_filesystem(&root_part) {
            Some(fs) if fs.is_ext() => self
                .toolchain
                .fsck(&root_part, fs)
                .map_err(|why| ResizeError::FilesystemCheckFailed { part: root_part, why })?,
            other => {
                return Err(ResizeError::FilesystemCheckFailed {
                    part: root_part,
                    why: io::Error::new(
                        io::ErrorKind::Other,
                        format!("root partition probed as {:?} after resize", other),
                    ),
                });
            }
        }

        Ok(())
    }

    fn rewrite_table(&self, device: &Path, table: &PartitionTable) -> Result<(), ResizeError> {
        self.toolchain.write_table(device, table)?;
        self.mapper.remap(device).map_err(|why| ResizeError::DeviceMap { why })
    }

    /// Refuses to touch a device while it, or any of its partitions, is
    /// mounted.
    fn ensure_unmounted(&self, device: &Path) -> Result<(), ResizeError> {
        let mounts = MountList::new()?;
        let prefix = device.to_string_lossy().into_owned();
        let partition_prefix = format!("{}p", prefix);

        let mounted = mounts.0.iter().any(|mount| {
            let source = mount.source.to_string_lossy();
            source == prefix || source.starts_with(&partition_prefix)
        });

        if mounted {
            return Err(ResizeError::DeviceMounted { device: device.to_path_buf() });
        }

        Ok(())
    }
}
