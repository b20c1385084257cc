//! The `imgfs` file server exposes the filesystem held in one disk image to
//! the kernel through FUSE.

mod server;

use imgfs::Filesystem;
use server::Bridge;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::exit;

/// Writes an error to stderr, then exits.
fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Structure storing command line arguments.
struct Args {
    /// Flags forwarded untouched to the kernel bridge.
    options: Vec<OsString>,
    /// The path to mount the filesystem on.
    mountpoint: OsString,
    /// The path to the disk image to open or create.
    image_path: PathBuf,
}

fn parse_args() -> Args {
    let mut args: Vec<OsString> = env::args_os().skip(1).collect();
    // bridge flags, the mountpoint, and the image path last
    if !(2..=4).contains(&args.len()) {
        error("imgfs", "usage: imgfs [options] <mountpoint> <image>");
    }
    let image_path = PathBuf::from(args.pop().unwrap());
    let mountpoint = args.pop().unwrap();
    Args {
        options: args,
        mountpoint,
        image_path,
    }
}

fn main() {
    let args = parse_args();
    let fs = Filesystem::open(&args.image_path).unwrap_or_else(|e| {
        error(
            "imgfs",
            format_args!("{}: {e}", args.image_path.display()),
        );
    });
    let options: Vec<&OsStr> = args.options.iter().map(OsString::as_os_str).collect();
    fuse::mount(Bridge::new(fs), &args.mountpoint, &options).unwrap_or_else(|e| {
        error("imgfs", format_args!("failed to mount: {e}"));
    });
}
