//! grow-dispatch entry point: CLI wiring, engine construction, and dry runs.

use std::path::Path;
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use grow_dispatch::config::FacilityConfig;
use grow_dispatch::dispatch::clock::{Clock, ManualClock, SystemClock};
use grow_dispatch::dispatch::control_loop::ControlLoop;
use grow_dispatch::dispatch::demand_response::{DrEventType, DrNotification};
use grow_dispatch::dispatch::engine::DispatchEngine;
use grow_dispatch::dispatch::executor::{Actuators, LoggingActuators};
use grow_dispatch::io::export::export_csv;
use grow_dispatch::meter::SimulatedMeter;

/// Demo DR event: `(start tick, duration, target kW)`.
type DrSpec = (usize, Duration, f32);

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    ticks: usize,
    start: Option<DateTime<Utc>>,
    dr: Option<DrSpec>,
    plan_out: Option<String>,
    live: bool,
    dry_run: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("grow-dispatch - energy dispatch and demand response for indoor grow facilities");
    eprintln!();
    eprintln!("Usage: grow-dispatch [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load facility from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        FacilityConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --ticks <n>              Control ticks to simulate (default: 24)");
    eprintln!("  --start <rfc3339>        Simulated start time (default: today 00:00 UTC)");
    eprintln!("  --dr <tick,hours,kw>     Inject a DR event at a tick");
    eprintln!("  --plan-out <path>        Export the latest dispatch plan to CSV");
    eprintln!("  --live                   Run the control loop on the wall clock");
    eprintln!("  --dry-run                Log actuator commands instead of applying them");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the run");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str, what: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.as_str(),
        None => fail(format!("{flag} requires {what}")),
    }
}

fn parse_dr(value: &str) -> Option<DrSpec> {
    let mut parts = value.split(',').map(str::trim);
    let tick = parts.next()?.parse().ok()?;
    let hours: i64 = parts.next()?.parse().ok()?;
    let kw = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours <= 0 {
        return None;
    }
    Some((tick, Duration::try_hours(hours)?, kw))
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        seed_override: None,
        ticks: 24,
        start: None,
        dr: None,
        plan_out: None,
        live: false,
        dry_run: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(next_value(&args, &mut i, "--config", "a path").to_string());
            }
            "--preset" => {
                cli.preset = Some(next_value(&args, &mut i, "--preset", "a name").to_string());
            }
            "--seed" => {
                let v = next_value(&args, &mut i, "--seed", "a u64 argument");
                match v.parse::<u64>() {
                    Ok(s) => cli.seed_override = Some(s),
                    Err(_) => fail(format!("--seed value \"{v}\" is not a valid u64")),
                }
            }
            "--ticks" => {
                let v = next_value(&args, &mut i, "--ticks", "a count");
                match v.parse::<usize>() {
                    Ok(n) if n > 0 => cli.ticks = n,
                    _ => fail(format!("--ticks value \"{v}\" must be a positive integer")),
                }
            }
            "--start" => {
                let v = next_value(&args, &mut i, "--start", "an RFC 3339 timestamp");
                match DateTime::parse_from_rfc3339(v) {
                    Ok(t) => cli.start = Some(t.with_timezone(&Utc)),
                    Err(e) => fail(format!("--start value \"{v}\": {e}")),
                }
            }
            "--dr" => {
                let v = next_value(&args, &mut i, "--dr", "tick,hours,kw");
                match parse_dr(v) {
                    Some(spec) => cli.dr = Some(spec),
                    None => fail(format!(
                        "--dr value \"{v}\" must look like 17,2,50 with a positive, representable duration"
                    )),
                }
            }
            "--plan-out" => {
                cli.plan_out = Some(next_value(&args, &mut i, "--plan-out", "a path").to_string());
            }
            "--live" => cli.live = true,
            "--dry-run" => cli.dry_run = true,
            #[cfg(feature = "api")]
            "--serve" => cli.serve = true,
            #[cfg(feature = "api")]
            "--port" => {
                let v = next_value(&args, &mut i, "--port", "a u16 argument");
                match v.parse::<u16>() {
                    Ok(p) => cli.port = p,
                    Err(_) => fail(format!("--port value \"{v}\" is not a valid u16")),
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> FacilityConfig {
    // --config takes priority, then --preset, then baseline
    let loaded = if let Some(ref path) = cli.config_path {
        FacilityConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        FacilityConfig::from_preset(name)
    } else {
        Ok(FacilityConfig::baseline())
    };
    let mut cfg = loaded.unwrap_or_else(|e| fail(e));

    if let Some(seed) = cli.seed_override {
        cfg.facility.seed = seed;
    }

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    cfg
}

fn default_start() -> DateTime<Utc> {
    Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn dr_notification(spec: DrSpec, at: DateTime<Utc>) -> Option<DrNotification> {
    let (_, duration, kw) = spec;
    Some(DrNotification {
        id: None,
        event_type: DrEventType::PeakReduction,
        start: at,
        end: at.checked_add_signed(duration)?,
        target_reduction_kw: kw,
    })
}

/// Ticks a simulated facility on a manual clock, one tick interval per step.
fn run_simulated(cfg: FacilityConfig, cli: &CliArgs) -> Arc<DispatchEngine> {
    let start = cli.start.unwrap_or_else(default_start);
    let step = Duration::seconds(i64::try_from(cfg.engine.tick_seconds).unwrap_or(3600));
    let clock = Arc::new(ManualClock::new(start));
    let mut meter = SimulatedMeter::new(&cfg);
    let actuators: Arc<dyn Actuators> = if cli.dry_run {
        Arc::new(LoggingActuators)
    } else {
        Arc::new(meter.actuators())
    };
    let engine = DispatchEngine::with_forecast_generator(cfg, actuators, clock.clone())
        .unwrap_or_else(|e| fail(e));

    for tick in 0..cli.ticks {
        if let Some(spec) = cli.dr.filter(|(at, _, _)| *at == tick) {
            let Some(notification) = dr_notification(spec, clock.now()) else {
                fail("--dr window ends past the latest representable time");
            };
            if let Err(e) = engine.notify_dr_event(notification) {
                eprintln!("warning: DR event rejected: {e}");
            }
        }
        let report = engine.tick(&mut meter);
        if let Some(plan) = report.plan.as_ref().and_then(|p| p.current_hour()) {
            println!("{} | {plan}", report.timestamp.format("%Y-%m-%d %H:%M"));
        }
        clock.advance(step);
    }

    Arc::new(engine)
}

/// Runs the control loop against the wall clock for `ticks` intervals.
fn run_live(cfg: FacilityConfig, cli: &CliArgs) -> Arc<DispatchEngine> {
    let interval = std::time::Duration::from_secs(cfg.engine.tick_seconds);
    let meter = SimulatedMeter::new(&cfg);
    let actuators: Arc<dyn Actuators> = if cli.dry_run {
        Arc::new(LoggingActuators)
    } else {
        Arc::new(meter.actuators())
    };
    let engine = Arc::new(
        DispatchEngine::with_forecast_generator(cfg, actuators, Arc::new(SystemClock))
            .unwrap_or_else(|e| fail(e)),
    );

    let control = ControlLoop::start(Arc::clone(&engine), Box::new(meter), interval)
        .unwrap_or_else(|e| fail(format!("failed to start control loop: {e}")));

    #[cfg(feature = "api")]
    if cli.serve {
        serve(&engine, cli.port);
    }

    let ticks = u32::try_from(cli.ticks).unwrap_or(u32::MAX);
    std::thread::sleep(interval.saturating_mul(ticks));
    let ran = control.stop();
    info!(ticks = ran, "live run finished");
    engine
}

#[cfg(feature = "api")]
fn serve(engine: &Arc<DispatchEngine>, port: u16) {
    use std::net::SocketAddr;

    let state = Arc::new(grow_dispatch::api::AppState {
        engine: Arc::clone(engine),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let rt = tokio::runtime::Runtime::new()
        .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));
    if let Err(e) = rt.block_on(grow_dispatch::api::serve(state, addr)) {
        fail(format!("API server: {e}"));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let cfg = load_config(&cli);
    info!(facility = %cfg.facility.name, horizon = cfg.facility.horizon_hours, "facility loaded");

    let window_hours = i64::try_from(cli.ticks)
        .unwrap_or(i64::MAX / 3600)
        .saturating_mul(i64::try_from(cfg.engine.tick_seconds).unwrap_or(3600))
        / 3600;
    let engine = if cli.live {
        run_live(cfg, &cli)
    } else {
        run_simulated(cfg, &cli)
    };

    match engine.latest_plan() {
        Some(plan) => {
            println!("\n{plan}");
            if let Some(ref path) = cli.plan_out {
                if let Err(e) = export_csv(&plan, Path::new(path)) {
                    fail(format!("failed to write CSV: {e}"));
                }
                eprintln!("Dispatch plan written to {path}");
            }
        }
        None => eprintln!("warning: no dispatch plan was produced"),
    }

    for event in engine.dr_events() {
        println!(
            "DR {} {:?}: {:.1}/{:.1} kW ({:?}, ${:.2})",
            event.id,
            event.event_type,
            event.actual_reduction_kw,
            event.target_reduction_kw,
            event.status,
            event.incentive_earned
        );
    }

    let window = Duration::try_hours(window_hours.max(1)).unwrap_or(Duration::MAX);
    println!("\n{}", engine.summary(window));

    #[cfg(feature = "api")]
    if cli.serve && !cli.live {
        serve(&engine, cli.port);
    }
}
