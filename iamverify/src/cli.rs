use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::commands;

/// Styles for CLI
fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightCyan))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  #[clap(flatten)]
  pub verbose: Verbosity<InfoLevel>,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Deploy aws-iam and verify authentication and RBAC through it
  ///
  /// The add-on is removed and authorization reset to AlwaysAllow afterwards,
  /// including when verification fails unless --keep-on-failure is set.
  Verify(commands::verify::Verify),

  /// Reset authorization to AlwaysAllow and remove aws-iam
  Teardown(commands::teardown::Teardown),
}
