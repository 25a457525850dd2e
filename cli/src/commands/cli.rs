use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use crewline_core::api::RunMode;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Mock,
    Real,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mock => RunMode::Mock,
            ModeArg::Real => RunMode::Real,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "crewline", version, about = "Run multi-agent crews")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; overrides $CREWLINE_CONFIG and the default search path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    /// Crew definition (TOML or JSON).
    pub crew_file: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Crew definition (TOML or JSON).
    pub crew_file: PathBuf,

    /// Input variable (KEY=VALUE). Can be specified multiple times.
    #[arg(short = 'i', long = "input", action = clap::ArgAction::Append)]
    pub inputs: Vec<String>,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Print the final snapshot as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Directory of crew definitions loaded at startup.
    #[arg(long)]
    pub crews_dir: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a crew's plan without running it.
    Validate(ValidateArgs),
    /// Run a crew once and wait for the outcome.
    Run(RunArgs),
    /// Serve the execution API over HTTP.
    Serve(ServeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let args = Args::parse_from([
            "crewline",
            "run",
            "crew.toml",
            "-i",
            "topic=rust",
            "--input",
            "n=2",
            "--mode",
            "real",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.crew_file, PathBuf::from("crew.toml"));
        assert_eq!(run.inputs, vec!["topic=rust", "n=2"]);
        assert_eq!(run.mode, Some(ModeArg::Real));
        assert!(!run.json);
    }

    #[test]
    fn test_parse_serve_args() {
        let args = Args::parse_from(["crewline", "serve", "--crews-dir", "crews", "--port", "9000"]);
        let Commands::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.crews_dir, Some(PathBuf::from("crews")));
        assert_eq!(serve.port, Some(9000));
        assert_eq!(serve.host, None);
    }
}
