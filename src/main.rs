mod binaries;

use std::io::{stdin, stdout, Write};
use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use mfs::config::Config;
use mfs::fs::error::{Error, Result};
use mfs::fs::vfs::Vfs;

/// Browse read-only mfs images
#[derive(Debug, Parser)]
#[clap(author, version, about, trailing_var_arg = true)]
struct Cli {
  /// Mount table to load
  #[clap(short, long, conflicts_with = "image")]
  config: Option<PathBuf>,

  /// Single image to mount read-only at `/`
  #[clap(short, long)]
  image: Option<PathBuf>,

  /// Log filter, e.g. `info` or `mfs=debug`
  #[clap(long)]
  log_level: Option<String>,

  /// Run one command and exit instead of starting the shell
  #[clap(multiple_values = true, allow_hyphen_values = true)]
  command: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
  match (&cli.config, &cli.image) {
    (Some(config_path), _) => Config::from_path(config_path),
    (None, Some(image)) => Ok(Config::single_image(image.clone())),
    (None, None) => Err(Error::Config("either --config or --image is required".to_owned())),
  }
}

fn shell(vfs: &mut Vfs) -> binaries::ExitCode {
  let mut command = String::new();
  let mut last = binaries::EXIT_SUCCESS;
  loop {
    command.clear();
    print!("# ");
    let _ = stdout().flush();
    match stdin().read_line(&mut command) {
      Ok(0) => break,
      Ok(_) => (),
      Err(error) => {
        error!("reading command: {error}");
        break;
      },
    }

    let args = command
      .split_whitespace()
      .map(str::to_owned)
      .collect::<binaries::Args>();

    match args.get(0).map(String::as_str) {
      Some("exit") => break,
      _ => last = binaries::run(args, vfs, &mut stdout()),
    }
  }
  last
}

pub fn main() {
  let cli = Cli::parse();

  let config = match load_config(&cli) {
    Ok(config) => config,
    Err(error) => {
      eprintln!("mfs: {error}");
      std::process::exit(binaries::EXIT_FAILURE as i32);
    },
  };

  let level = cli
    .log_level
    .clone()
    .or_else(|| config.log_level.clone())
    .unwrap_or_else(|| "warn".to_owned());
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

  let mut vfs = match config.mount_all() {
    Ok(vfs) => vfs,
    Err(error) => {
      eprintln!("mfs: mount failed ({}): {error}", error.errno());
      std::process::exit(binaries::EXIT_FAILURE as i32);
    },
  };
  info!("{} filesystems mounted", vfs.mount_points.len());

  let code = if cli.command.is_empty() {
    shell(&mut vfs)
  } else {
    binaries::run(cli.command.clone(), &mut vfs, &mut stdout())
  };

  std::process::exit(code as i32);
}

// vim:ts=2 sw=2
