use clap::{Arg, Command};

use crate::routing::TieBreak;

pub const ARG_PLATFORM_DOMAIN: &str = "platform-domain";
pub const ARG_ROUTE_TIE_BREAK: &str = "route-tie-break";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PLATFORM_DOMAIN)
                .long(ARG_PLATFORM_DOMAIN)
                .help("Domain whose one-label subdomains address workers and projects by name")
                .default_value("workers.dev")
                .env("EDGEPLANE_PLATFORM_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_ROUTE_TIE_BREAK)
                .long(ARG_ROUTE_TIE_BREAK)
                .help("How to settle routes with equal specificity and priority: lexical or reject")
                .default_value("lexical")
                .env("EDGEPLANE_ROUTE_TIE_BREAK")
                .value_parser(clap::builder::ValueParser::new(|value: &str| {
                    value.parse::<TieBreak>()
                })),
        )
}

pub struct Options {
    pub platform_domain: String,
    pub tie_break: TieBreak,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Self {
        Self {
            platform_domain: matches
                .get_one::<String>(ARG_PLATFORM_DOMAIN)
                .cloned()
                .unwrap_or_else(|| "workers.dev".to_string()),
            tie_break: matches
                .get_one::<TieBreak>(ARG_ROUTE_TIE_BREAK)
                .copied()
                .unwrap_or_default(),
        }
    }
}
