//! # Mechanisms Bring-up Executable
//!
//! Exercises the actuators directly, without any perception or control in the loop, so that the
//! steering linkage and drive motor can be checked and trimmed on the bench.
//!
//! - `sweep-servo` centres the servo, sweeps the full pulse range and returns to centre.
//! - `motor-test` drives the motor forward at a list of PWM frequencies, stopping in between.
//!
//! Both commands always finish by shutting the actuators down, including when interrupted with
//! Ctrl-C.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use structopt::StructOpt;

// Internal
use mech_lib::{params::MechParams, Actuators};
use util::{
    host,
    logger::{logger_init, parse_level},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest hold, dwell or stop time accepted on the command line.
const MAX_STEP_DURATION: Duration = Duration::from_secs(600);

// ------------------------------------------------------------------------------------------------
// CLI
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "mech_exec", about = "Actuator bring-up and test tool")]
struct Opt {
    /// Log level (info, debug or trace)
    #[structopt(short, long, default_value = "debug")]
    log_level: String,

    /// Parameter file, relative to the params directory
    #[structopt(short, long, default_value = "mech_exec.toml")]
    params: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Sweep the steering servo across its pulse range
    SweepServo {
        /// First pulse width of the sweep, in microseconds
        #[structopt(long, default_value = "1000")]
        start_us: u32,

        /// Last pulse width of the sweep, in microseconds
        #[structopt(long, default_value = "2000")]
        end_us: u32,

        /// Pulse width increment, in microseconds
        #[structopt(long, default_value = "100")]
        step_us: u32,

        /// Time to hold each pulse width, in seconds
        #[structopt(long = "hold-s", default_value = "0.5", parse(try_from_str = parse_secs))]
        hold: Duration,
    },

    /// Drive the motor forward at a list of PWM frequencies
    MotorTest {
        /// PWM frequencies to test, in hertz
        #[structopt(long, default_value = "500,1000,8000", use_delimiter = true)]
        freqs_hz: Vec<f64>,

        /// Normalised forward speed
        #[structopt(long, default_value = "0.4")]
        speed: f64,

        /// Time to drive at each frequency, in seconds
        #[structopt(long = "dwell-s", default_value = "2.0", parse(try_from_str = parse_secs))]
        dwell: Duration,

        /// Time to stop between frequencies, in seconds
        #[structopt(long = "stop-s", default_value = "1.0", parse(try_from_str = parse_secs))]
        stop: Duration,
    },
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("mech_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(
        parse_level(&opt.log_level).wrap_err("Invalid log level")?,
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    info!("Mechanisms Bring-up Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: MechParams =
        util::params::load(&opt.params).wrap_err("Could not load mechanisms parameters")?;

    info!("Parameters loaded");

    // ---- INTERRUPT HANDLER ----

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .wrap_err("Failed to set the Ctrl-C handler")?;
    }

    // ---- RUN ----

    let mut actuators =
        mech_lib::init(&params).wrap_err("Failed to initialise the mechanisms")?;

    match opt.cmd {
        Command::SweepServo {
            start_us,
            end_us,
            step_us,
            hold,
        } => sweep_servo(&mut actuators, &interrupted, start_us, end_us, step_us, hold),
        Command::MotorTest {
            freqs_hz,
            speed,
            dwell,
            stop,
        } => motor_test(&mut actuators, &interrupted, &freqs_hz, speed, dwell, stop),
    }

    if interrupted.load(Ordering::SeqCst) {
        warn!("Interrupted by user");
    }

    actuators.shutdown();

    info!("End of execution");
    session.exit();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn sweep_servo(
    actuators: &mut Actuators,
    interrupted: &AtomicBool,
    start_us: u32,
    end_us: u32,
    step_us: u32,
    hold: Duration,
) {
    info!(
        "Sweeping servo from {} us to {} us in {} us steps",
        start_us, end_us, step_us
    );

    actuators.set_steering(0.0);
    if !wait(hold, interrupted) {
        return;
    }

    let mut pulse_us = start_us;
    while pulse_us <= end_us {
        let pulse = actuators.set_steering_pulse_us(pulse_us);
        info!("Servo pulse {:?}", pulse);

        if !wait(hold, interrupted) {
            return;
        }

        if step_us == 0 {
            break;
        }
        pulse_us += step_us;
    }

    info!("Returning servo to centre");
    actuators.set_steering(0.0);
    wait(hold, interrupted);
    actuators.disable_steering();
}

fn motor_test(
    actuators: &mut Actuators,
    interrupted: &AtomicBool,
    freqs_hz: &[f64],
    speed: f64,
    dwell: Duration,
    stop: Duration,
) {
    for &freq_hz in freqs_hz {
        info!("Driving at speed {:.2} with PWM at {} Hz", speed, freq_hz);
        actuators.set_pwm_frequency(freq_hz);
        actuators.set_motor(speed);

        if !wait(dwell, interrupted) {
            return;
        }

        info!("Stopping");
        actuators.set_motor(0.0);

        if !wait(stop, interrupted) {
            return;
        }
    }
}

/// Parse a time in seconds from the command line. Negative times are zero.
fn parse_secs(src: &str) -> Result<Duration, String> {
    let secs: f64 = src
        .parse()
        .map_err(|e| format!("{:?} is not a number of seconds: {}", src, e))?;

    if secs.is_nan() {
        return Err(format!("{:?} is not a number of seconds", src));
    }

    match Duration::try_from_secs_f64(secs.max(0.0)) {
        Ok(d) if d <= MAX_STEP_DURATION => Ok(d),
        _ => Err(format!(
            "{} s is longer than the {} s limit",
            secs,
            MAX_STEP_DURATION.as_secs()
        )),
    }
}

/// Sleep for the given duration, returning `false` early if an interrupt is raised.
fn wait(duration: Duration, interrupted: &AtomicBool) -> bool {
    let end = Instant::now() + duration;

    while Instant::now() < end {
        if interrupted.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(Duration::from_millis(10).min(end.saturating_duration_since(Instant::now())));
    }

    !interrupted.load(Ordering::SeqCst)
}
