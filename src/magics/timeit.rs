//! `%timeit [-n N] [-r R] [-p P] stmt` and its cell form.
//!
//! The code is submitted `N` times per run, for `R` runs, and the mean and
//! standard deviation of the per-loop wall-clock time are published.

use std::time::{Duration, Instant};

use super::{MagicError, MagicInvocation, MagicKind};
use crate::config::TimeitConfig;
use crate::preamble::DirectiveContext;
use crate::publish::{Publisher, StreamName};

/// A run must last at least this long when the loop count is picked automatically
const AUTORANGE_TARGET: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeitOptions {
    /// Loops per run; `None` picks a count automatically
    pub loops: Option<u32>,
    pub repeat: u32,
    pub precision: usize,
}

impl TimeitOptions {
    /// Parse leading options; returns the options and the remaining statement
    pub fn parse<'a>(args: &'a str, defaults: &TimeitConfig) -> Result<(Self, &'a str), MagicError> {
        let mut options = TimeitOptions {
            loops: None,
            repeat: defaults.repeat,
            precision: defaults.precision,
        };

        let mut rest = args.trim_start();
        loop {
            let (flag, after_flag) = split_word(rest);
            let slot = match flag {
                "-n" | "-r" | "-p" => flag,
                _ => break,
            };
            let (number, after_number) = split_word(after_flag);
            let number: u32 = number
                .parse()
                .map_err(|_| MagicError::Usage(format!("%timeit: {} expects a positive integer", slot)))?;
            if number == 0 && slot != "-p" {
                return Err(MagicError::Usage(format!("%timeit: {} must be at least 1", slot)));
            }
            match slot {
                "-n" => options.loops = Some(number),
                "-r" => options.repeat = number,
                _ => options.precision = number as usize,
            }
            rest = after_number;
        }

        Ok((options, rest.trim()))
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

pub(super) fn run(invocation: &MagicInvocation<'_>, ctx: &mut DirectiveContext<'_>) -> Result<(), MagicError> {
    let (options, statement) = TimeitOptions::parse(invocation.args, &ctx.config.timeit)?;
    let code = match invocation.kind {
        MagicKind::Line => statement,
        MagicKind::Cell => invocation.body.trim(),
    };
    if code.is_empty() {
        return Err(MagicError::Usage("%timeit: nothing to time".into()));
    }

    let max_loops = ctx.config.timeit.max_loops;
    let loops = match options.loops {
        Some(loops) => loops,
        None => autorange(ctx, code, max_loops)?,
    };

    let mut per_loop = Vec::with_capacity(options.repeat as usize);
    for _ in 0..options.repeat {
        let elapsed = time_loops(ctx, code, loops)?;
        per_loop.push(elapsed.as_secs_f64() / f64::from(loops));
    }

    let (mean, stdev) = mean_and_stdev(&per_loop);
    let message = format!(
        "{} ± {} per loop (mean ± std. dev. of {} run{}, {} loop{} each)\n",
        format_duration(mean, options.precision),
        format_duration(stdev, options.precision),
        options.repeat,
        plural(options.repeat),
        loops,
        plural(loops),
    );
    ctx.publisher.publish_stream(StreamName::Stdout, &message);
    Ok(())
}

/// Powers of ten until one run lasts long enough, capped at `max_loops`
fn autorange(ctx: &mut DirectiveContext<'_>, code: &str, max_loops: u32) -> Result<u32, MagicError> {
    let mut loops: u32 = 1;
    loop {
        if time_loops(ctx, code, loops)? >= AUTORANGE_TARGET || loops >= max_loops {
            return Ok(loops.min(max_loops.max(1)));
        }
        loops = loops.saturating_mul(10);
    }
}

fn time_loops(ctx: &mut DirectiveContext<'_>, code: &str, loops: u32) -> Result<Duration, MagicError> {
    let start = Instant::now();
    for _ in 0..loops {
        let submission = ctx.backend.submit(code)?;
        if submission.is_fatal() {
            if submission.error_level != 0 {
                ctx.backend.cancel_continuation();
            }
            return Err(MagicError::Failed("%timeit: the timed code failed to run".into()));
        }
    }
    Ok(start.elapsed())
}

fn mean_and_stdev(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let count = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / count;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count;
    (mean, variance.sqrt())
}

fn plural(count: u32) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Render seconds in the largest unit that keeps the value at or above one
pub fn format_duration(seconds: f64, precision: usize) -> String {
    const UNITS: [(&str, f64); 4] = [("s", 1.0), ("ms", 1e-3), ("µs", 1e-6), ("ns", 1e-9)];

    for (unit, scale) in UNITS {
        if seconds >= scale {
            return format!("{:.*} {}", precision, seconds / scale, unit);
        }
    }
    format!("{:.*} ns", precision, seconds / 1e-9)
}
