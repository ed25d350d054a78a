//! Lux Coro CLI
//!
//! Runs a scripted request through the scheduler and reports how it ended.

use std::env;
use std::process;

use tracing_subscriber::EnvFilter;

use lux_coro::coroutine::{named, Completer, Deferred, LogContext};
use lux_coro::{
    CoroError, Diagnostic, Handler, Resume, Resumption, RunMode, Scheduler, Suspend, Task,
    TaskConfig, TaskOutcome, TimeoutDelivery, Value, VERSION,
};

/// Prints failures nobody caught
struct ConsoleHandler {
    request: String,
}

impl Handler for ConsoleHandler {
    fn on_unrecoverable_failure(&mut self, failure: CoroError) {
        eprint!("{}", Diagnostic::with_task(failure, self.request.as_str()));
    }

    fn teardown(&mut self) {
        println!("handler for {} torn down", self.request);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config = TaskConfig::new();
    let mut time_out = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "--console" | "-c" => config = config.with_mode(RunMode::Console),
            "--timeout" | "-t" => time_out = true,
            "--legacy-timeout" => {
                config = config.with_timeout_delivery(TimeoutDelivery::SendFalse)
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_usage();
                process::exit(1);
            }
        }
    }

    if let Err(e) = run_demo(config, time_out) {
        eprint!("{}", Diagnostic::new(e));
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: lux-coro [OPTIONS]");
    eprintln!("       lux-coro --help");
}

fn print_help() {
    println!("Lux Coro v{} - stackless coroutine task driver", VERSION);
    println!();
    println!("USAGE:");
    println!("    lux-coro [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --console          Tasks tear down their handler on destroy");
    println!("    -t, --timeout          Let the awaited lookup time out");
    println!("        --legacy-timeout   Resume timed-out awaits with false instead of raising");
    println!("    -h, --help             Show this help message");
    println!();
    println!("Set RUST_LOG=debug to trace every step.");
}

/// A request handler calling a nested lookup that awaits `op`
fn request(op: Deferred) -> Task {
    let mut op = Some(op);
    let lookup = named("fetch_user", move |input| match input {
        Resumption::Start => match op.take() {
            Some(op) => Ok(Resume::Yield(Suspend::await_on(op))),
            None => Err(CoroError::internal("fetch_user restarted")),
        },
        Resumption::Send(user) => Ok(Resume::Return(user)),
        Resumption::Throw(err) => Err(err),
    });

    let mut lookup = Some(lookup);
    let body = named("handle_request", move |input| match input {
        Resumption::Start => match lookup.take() {
            Some(lookup) => Ok(Resume::Yield(Suspend::call(lookup))),
            None => Err(CoroError::internal("handle_request restarted")),
        },
        Resumption::Send(Value::Bool(false)) => Ok(Resume::Return(Value::table([
            ("status", Value::from("unavailable")),
        ]))),
        Resumption::Send(user) => Ok(Resume::Return(Value::table([
            ("status", Value::from("ok")),
            ("user", user),
        ]))),
        Resumption::Throw(err) => Err(err),
    });

    Task::new(body, LogContext::new("req-1"))
}

fn run_demo(config: TaskConfig, time_out: bool) -> Result<(), CoroError> {
    let mut scheduler = Scheduler::new();
    let (op, done): (Deferred, Completer) = Deferred::new("users.get");
    let task = request(op).with_config(config).with_handler(ConsoleHandler {
        request: "req-1".to_string(),
    });

    let id = scheduler.spawn(task)?;
    // enter the lookup, then suspend on the pending operation
    scheduler.tick();
    scheduler.wake(&id)?;
    scheduler.tick();

    if time_out {
        done.time_out();
    } else {
        done.complete(Value::table([("name", Value::from("ada"))]));
    }
    scheduler.wake(&id)?;
    scheduler.tick();

    match scheduler.take_outcome(&id) {
        Some(TaskOutcome::Completed(value)) => println!("{} completed: {}", id, value),
        Some(TaskOutcome::Failed(_)) => println!("{} failed", id),
        Some(TaskOutcome::Cancelled) => println!("{} cancelled", id),
        None => {
            println!("{} still pending, cancelling", id);
            scheduler.cancel(&id);
        }
    }

    Ok(())
}
