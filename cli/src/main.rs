#[macro_use]
extern crate clap;

use clap::{App, Arg, ArgMatches};
use imgresize::{
    logging, LoopDeviceMap, ResizeRequest, Resizer, SizeSpec, SystemToolchain,
};
use log::LevelFilter;
use pbr::ProgressBar;
use std::{cell::RefCell, io, path::PathBuf, process::exit};

fn main() {
    let matches = App::new("imgresize")
        .about("Resizes the boot and root partitions of a two-partition disk image")
        .version(crate_version!())
        .arg(
            Arg::with_name("IMAGE")
                .help("the disk image to operate on")
                .required(true),
        )
        .arg(
            Arg::with_name("boot-size")
                .long("boot-size")
                .takes_value(true)
                .value_name("SIZE")
                .help("target size of the boot partition, e.g. 256M"),
        )
        .arg(
            Arg::with_name("size")
                .long("size")
                .takes_value(true)
                .value_name("SIZE")
                .help("target size of the image as a whole, e.g. 64GB"),
        )
        .arg(
            Arg::with_name("label")
                .long("label")
                .takes_value(true)
                .value_name("LABEL")
                .help("volume label for the rebuilt boot filesystem"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("enable debug logging"),
        )
        .get_matches();

    let filter = if matches.is_present("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    if let Err(why) = logging::log(filter) {
        eprintln!("failed to initialize logging: {}", why);
    }

    let request = match build_request(&matches) {
        Ok(request) => request,
        Err(why) => {
            eprintln!("imgresize: {}", why);
            exit(1);
        }
    };

    let toolchain = SystemToolchain;
    let mapper = LoopDeviceMap;
    let bar = RefCell::new(None::<ProgressBar<io::Stdout>>);

    let mut resizer = Resizer::new(&toolchain, &mapper);
    resizer.on_relocation_progress(|copied, total| {
        let mut slot = bar.borrow_mut();
        let progress = slot.get_or_insert_with(|| {
            let mut progress = ProgressBar::new(total);
            progress.message("relocating root partition: ");
            progress
        });
        progress.set(copied);
    });

    match resizer.run(&request) {
        Ok(()) => {
            if let Some(progress) = bar.borrow_mut().as_mut() {
                progress.finish();
            }
        }
        Err(why) => {
            eprintln!("imgresize: {} step failed: {}", resizer.step(), why);
            exit(1);
        }
    }
}

fn build_request(matches: &ArgMatches) -> Result<ResizeRequest, String> {
    let image = PathBuf::from(matches.value_of("IMAGE").expect("IMAGE is required"));
    let boot_size = parse_size_arg(matches, "boot-size")?;
    let image_size = parse_size_arg(matches, "size")?;

    if boot_size.is_none() && image_size.is_none() {
        return Err("nothing to do: pass --boot-size and/or --size".into());
    }

    Ok(ResizeRequest {
        image,
        boot_size,
        image_size,
        boot_label: matches.value_of("label").map(String::from),
    })
}

fn parse_size_arg(matches: &ArgMatches, name: &str) -> Result<Option<SizeSpec>, String> {
    match matches.value_of(name) {
        Some(value) => value
            .parse::<SizeSpec>()
            .map(Some)
            .map_err(|why| format!("invalid --{} value: {}", name, why)),
        None => Ok(None),
    }
}
