use anyhow::{bail, Context, Result};
use rekordsync_lib::commands::{self, AppState};
use rekordsync_lib::scanner::ScannedFolder;
use rekordsync_lib::{config, logging, source_watcher};
use std::env;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

const WATCH_DEBOUNCE: Duration = Duration::from_secs(2);

const USAGE: &str = "Usage: rekordsync [--debug] <command>

Commands:
  config show                   Print settings and file locations
  config set-source <dir>       Set the music folder to scan
  config set-catalog <file>     Set the rekordbox XML catalog
  scan [dir]                    Print the folder tree that would be synced
  diff                          Preview what a sync would change
  sync [--keep-removed]         Update the catalog from the music folder
  playlists                     List playlist paths in the catalog
  usb-plan <drive> <playlist>...  Show which drive files are out of date
  usb-sync <drive> <playlist>...  Refresh out-of-date files on the drive
  watch                         Print a diff whenever the music folder changes";

fn main() {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let debug = take_flag(&mut args, "--debug");

    if let Err(e) = logging::init(Some(config::log_dir()), debug) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    if let Err(e) = run(args) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    args.len() != before
}

fn run(mut args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }
    let command = args.remove(0);
    let mut state = AppState::from_default_location()?;

    match command.as_str() {
        "config" => config_command(&mut state, &args),
        "scan" => {
            let root = match args.first() {
                Some(dir) => PathBuf::from(dir),
                None => state.source_folder()?,
            };
            let folders = rekordsync_lib::scanner::scan(&root)
                .with_context(|| format!("Failed to scan {:?}", root))?;
            for folder in &folders {
                print_folder(folder, 0);
            }
            Ok(())
        }
        "diff" => {
            let diff = commands::preview_sync(&state)?;
            println!("{}", diff.summary());
            for file in &diff.new_files {
                println!("  + {}", file.path.display());
            }
            for track in &diff.removed_tracks {
                println!("  - [{}] {}", track.track_id, track.file_path().display());
            }
            Ok(())
        }
        "sync" => {
            let keep_removed = take_flag(&mut args, "--keep-removed");
            let outcome = commands::run_sync(&state, keep_removed)?;
            println!("{}", outcome.summary);
            println!(
                "Removed {}, added {}, {} playlists, {} tracks in catalog",
                outcome.report.removed,
                outcome.report.added,
                outcome.report.playlists,
                outcome.total_tracks
            );
            Ok(())
        }
        "playlists" => {
            for path in commands::list_playlists(&state)? {
                println!("{}", path);
            }
            Ok(())
        }
        "usb-plan" => {
            let (drive, playlists) = drive_args(&args)?;
            let plan = commands::plan_usb_sync(&state, &drive, &playlists)?;
            if plan.is_empty() {
                println!("Drive is up to date");
            }
            for copy in &plan.copies {
                println!("{} -> {}", copy.source.display(), copy.destination.display());
            }
            Ok(())
        }
        "usb-sync" => {
            let (drive, playlists) = drive_args(&args)?;
            let copied = commands::run_usb_sync(&state, &drive, &playlists, |progress| {
                println!("[{}/{}] {}", progress.completed, progress.total, progress.file_name);
            })?;
            println!("Copied {} files", copied);
            Ok(())
        }
        "watch" => watch(&state),
        other => {
            println!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

fn config_command(state: &mut AppState, args: &[String]) -> Result<()> {
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("show") | None, _) => {
            println!("source_folder_path: {}", state.settings.source_folder_path);
            println!("catalog_file_path:  {}", state.settings.catalog_file_path);
            println!("settings file:      {}", state.settings_path.display());
            println!("track ids file:     {}", state.track_ids_path.display());
            match logging::logger().and_then(|logger| logger.stats()) {
                Some(stats) => println!(
                    "logs:               {} ({} files, {} bytes)",
                    stats.log_dir, stats.file_count, stats.total_size_bytes
                ),
                None => println!("logs:               {}", config::log_dir().display()),
            }
            Ok(())
        }
        (Some("set-source"), Some(dir)) => {
            let dir = commands::set_source_folder(state, Path::new(dir))?;
            println!("Source folder: {}", dir.display());
            Ok(())
        }
        (Some("set-catalog"), Some(file)) => {
            let file = commands::set_catalog_file(state, Path::new(file))?;
            println!("Catalog file: {}", file.display());
            Ok(())
        }
        _ => bail!("Usage: rekordsync config show | set-source <dir> | set-catalog <file>"),
    }
}

fn drive_args(args: &[String]) -> Result<(PathBuf, Vec<String>)> {
    match args.split_first() {
        Some((drive, playlists)) if !playlists.is_empty() => {
            Ok((PathBuf::from(drive), playlists.to_vec()))
        }
        _ => bail!("Expected a drive path followed by one or more playlist paths"),
    }
}

fn print_folder(folder: &ScannedFolder, depth: usize) {
    println!(
        "{}{}/ ({} files)",
        "  ".repeat(depth),
        folder.name,
        folder.files.len()
    );
    for child in &folder.children {
        print_folder(child, depth + 1);
    }
}

fn watch(state: &AppState) -> Result<()> {
    let source = state.source_folder()?;
    println!("Watching {} (Ctrl-C to stop)", source.display());

    source_watcher::watch_source(&source, WATCH_DEBOUNCE, |_| {
        match commands::preview_sync(state) {
            Ok(diff) => println!("{}", diff.summary()),
            Err(e) => log::warn!("Rescan failed: {:#}", e),
        }
        ControlFlow::Continue(())
    })?;
    Ok(())
}
