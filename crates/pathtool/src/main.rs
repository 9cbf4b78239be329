// pathtool - Command line front-end of the navigation engine
//
// Route queries, coordinate conversion and height probing against the
// extracted chunk data, for checking data sets and tuning settings.

use std::path::Path;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use pather::{NavConfig, NavigationService, ScoreMode, Vec3, WorldLocation};
use pather_shared::config::get_config;
use pather_shared::log::{DEFAULT_LOG_FILE, initialize_logging, map_log_level};

/// Default config file name
const DEFAULT_CONFIG: &str = "pather.conf";

/// Environment override prefix, e.g. Pather_Nav_DataDir
const ENV_PREFIX: &str = "Pather_";

#[derive(Parser, Debug)]
#[command(name = "pathtool")]
#[command(about = "World navigation engine tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Console log level override (0=Error, 1=Warn, 2=Info, 3=Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search a route between two world points
    Route(RouteArgs),
    /// Convert UI map percentages to world coordinates
    ToWorld(ToWorldArgs),
    /// Convert a world point to UI map percentages
    ToLocal(ToLocalArgs),
    /// Find the standing height of a world column
    ResolveZ(ResolveZArgs),
    /// Search a route, then persist the grown spot graph
    Save(RouteArgs),
}

fn parse_point(input: &str) -> Result<Vec3, String> {
    let parts: Vec<f32> = input
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|_| format!("Invalid coordinate '{}'", p)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        [x, y] => Ok(Vec3::new(*x, *y, 0.0)),
        _ => Err("Expected X,Y[,Z]".to_string()),
    }
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Map id
    #[arg(short, long, default_value_t = 0)]
    map: u32,

    /// Start point (format: X,Y,Z)
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    from: Vec3,

    /// End point (format: X,Y,Z)
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    to: Vec3,

    /// Penalize walking next to or across models and objects
    #[arg(long)]
    avoid_models: bool,

    /// Extra simplification pass after Nav.SimplifyTolerance
    #[arg(long)]
    simplify: Option<f32>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ToWorldArgs {
    /// UI map id
    #[arg(short, long)]
    ui_map: u32,

    /// UI map point in percent (format: X,Y)
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    point: Vec3,

    /// Height hint
    #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
    z: f32,

    /// Snap z to the standing height near the hint
    #[arg(long)]
    snap: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ToLocalArgs {
    /// Map id
    #[arg(short, long)]
    map: u32,

    /// World point (format: X,Y,Z)
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    point: Vec3,

    /// UI map id for points in overlapping zones
    #[arg(short, long)]
    ui_map: Option<u32>,

    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ResolveZArgs {
    /// Map id
    #[arg(short, long)]
    map: u32,

    /// World point with a height hint (format: X,Y,Z)
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    point: Vec3,

    #[arg(long)]
    json: bool,
}

fn init_logging(log_level: Option<i32>) {
    let (dir, configured) = {
        let config = get_config().lock();
        (config.get_string("LogsDir"), config.get_int_default("LogLevel", 2))
    };
    let level = map_log_level(log_level.unwrap_or(configured));
    let log_dir = (!dir.is_empty()).then_some(dir);
    initialize_logging(log_dir.as_deref(), level, Some(DEFAULT_LOG_FILE));
}

fn load_settings(path: &str) -> NavConfig {
    let mut config = get_config().lock();
    // A missing file leaves defaults plus environment overrides
    config.set_source(path, ENV_PREFIX);
    NavConfig::from_config(&config)
}

fn print<T: Serialize + std::fmt::Debug>(value: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:?}", value);
    }
    Ok(())
}

fn run_route(nav: &mut NavigationService, args: &RouteArgs) -> anyhow::Result<bool> {
    let mode = if args.avoid_models {
        ScoreMode::AvoidModels
    } else {
        ScoreMode::AStar
    };
    let from = WorldLocation::from_position(args.from, args.map);
    let to = WorldLocation::from_position(args.to, args.map);
    tracing::info!("Route on map {}: {:?} -> {:?} ({:?})", args.map, args.from, args.to, mode);

    let Some(mut route) = nav.find_route(from, to, mode)? else {
        tracing::warn!("No route found");
        if let Some(closest) = nav.closest_spot() {
            tracing::info!("Closest spot reached: {:?}", closest);
        }
        return Ok(false);
    };

    if let Some(tolerance) = args.simplify {
        let points: Vec<Vec3> = route.iter().map(|p| p.position()).collect();
        route = pather::simplify(&points, tolerance)
            .into_iter()
            .map(|p| WorldLocation::from_position(p, args.map))
            .collect();
    }

    if args.json {
        print(&route, true)?;
    } else {
        for p in &route {
            println!("{:.3} {:.3} {:.3}", p.x, p.y, p.z);
        }
    }
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(&cli.config);
    init_logging(cli.log_level);
    if Path::new(&cli.config).exists() {
        tracing::info!("Using configuration file: {}", cli.config);
    } else {
        tracing::warn!("Configuration file {} not found, using defaults", cli.config);
    }

    let mut nav = NavigationService::from_config(settings).context("Cannot set up navigation service")?;

    match cli.command {
        Command::Route(args) => {
            if !run_route(&mut nav, &args)? {
                std::process::exit(1);
            }
        }
        Command::Save(args) => {
            run_route(&mut nav, &args)?;
            let written = nav.save().context("Cannot save spot graph")?;
            println!("{} spot groups written", written);
        }
        Command::ToWorld(args) => {
            let location = if args.snap {
                nav.to_world_z(args.ui_map, args.point.x, args.point.y, args.z)?
            } else {
                nav.to_world(args.ui_map, args.point.x, args.point.y, args.z)?
            };
            print(&location, args.json)?;
        }
        Command::ToLocal(args) => {
            let local = nav.to_local(args.point, args.map, args.ui_map)?;
            print(&local, args.json)?;
        }
        Command::ResolveZ(args) => {
            let location = WorldLocation::from_position(args.point, args.map);
            match nav.resolve_z(location)? {
                Some(resolved) => print(&resolved, args.json)?,
                None => {
                    tracing::warn!("Nothing to stand on at {:?}", args.point);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
