pub mod logging;
pub mod routing;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("edgeplane")
        .about("Control plane and request resolver for edge workers and projects")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("EDGEPLANE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("EDGEPLANE_DSN")
                .required(true),
        )
        .arg(
            Arg::new("max-connections")
                .long("max-connections")
                .help("Maximum number of pooled database connections")
                .default_value("5")
                .env("EDGEPLANE_MAX_CONNECTIONS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        );

    let command = routing::with_args(command);
    logging::with_args(command)
}
