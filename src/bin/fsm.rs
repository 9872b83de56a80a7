//! Demonstration and test application.
//! Usage:
//!    fsm <config.json> [--datamodel=expr] [--strict] [--initial=<path>]
//!
//! Loads a JSON statechart configuration (spec.md §6.1), constructs a
//! session, and then drives it from stdin: one line per external event,
//! `name` or `name:<json payload>`. The active configuration is printed
//! after construction and after every macrostep.

use std::io::{stdin, stdout, Write};
use std::{fs, process};

use log::error;

use harel_fsm::common::{get_arguments, init_logging, ArgOption};
use harel_fsm::config::StateConfig;
use harel_fsm::datamodel::Data;
use harel_fsm::model::BindingType;
use harel_fsm::session::{Session, SessionOptions};

static DATAMODEL_ARGUMENT: ArgOption = ArgOption {
    name: "datamodel",
    with_value: true,
    required: false,
};

static INITIAL_ARGUMENT: ArgOption = ArgOption {
    name: "initial",
    with_value: true,
    required: false,
};

static STRICT_ARGUMENT: ArgOption = ArgOption {
    name: "strict",
    with_value: false,
    required: false,
};

static LATE_BINDING_ARGUMENT: ArgOption = ArgOption {
    name: "late-binding",
    with_value: false,
    required: false,
};

fn main() {
    init_logging();

    let (named_opt, final_args) = get_arguments(&[
        &DATAMODEL_ARGUMENT,
        &INITIAL_ARGUMENT,
        &STRICT_ARGUMENT,
        &LATE_BINDING_ARGUMENT,
    ]);

    if final_args.is_empty() {
        println!("Usage: fsm <config.json> [--datamodel=expr] [--strict] [--initial=<path>]");
        process::exit(1);
    }

    let text = match fs::read_to_string(&final_args[0]) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read {}: {}", final_args[0], e);
            process::exit(1);
        }
    };

    let config: StateConfig = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to parse {}: {}", final_args[0], e);
            process::exit(1);
        }
    };

    let options = SessionOptions {
        datamodel: named_opt.get("datamodel").cloned().unwrap_or_else(|| "expr".to_string()),
        strict: named_opt.contains_key("strict"),
        initial: named_opt.get("initial").cloned(),
        binding: if named_opt.contains_key("late-binding") {
            BindingType::Late
        } else {
            BindingType::Early
        },
        ..SessionOptions::default()
    };

    let mut session = match Session::new(&config, options) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to construct session from {}: {}", final_args[0], e);
            process::exit(1);
        }
    };

    println!("Session {} constructed.", session.id());
    print_active(&session);

    input_loop(&mut session);
}

fn input_loop(session: &mut Session) {
    let mut line = String::new();
    loop {
        print!("\nEnter Event (or 'quit') >> ");
        let _ = stdout().flush();
        line.clear();
        match stdin().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
                    break;
                }
                let (name, payload) = match trimmed.split_once(':') {
                    Some((n, p)) => (n, Some(parse_payload(p))),
                    None => (trimmed, None),
                };
                match session.trigger(name, payload) {
                    Ok(result) => {
                        if !matches!(result, Data::Null) {
                            println!("-> {:?}", result);
                        }
                    }
                    Err(e) => println!("! {}", e),
                }
                print_active(session);
            }
            Err(e) => {
                error!("Error reading stdin: {}", e);
                break;
            }
        }
    }
    println!("Session {} finished.", session.id());
}

fn parse_payload(raw: &str) -> Data {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Null) => Data::Null,
        Ok(serde_json::Value::Bool(b)) => Data::Bool(b),
        Ok(serde_json::Value::Number(n)) => Data::Number(n.as_f64().unwrap_or(0.0)),
        Ok(serde_json::Value::String(s)) => Data::String(s),
        Ok(other) => json_to_data(&other),
        Err(_) => Data::String(raw.to_string()),
    }
}

fn json_to_data(v: &serde_json::Value) -> Data {
    match v {
        serde_json::Value::Null => Data::Null,
        serde_json::Value::Bool(b) => Data::Bool(*b),
        serde_json::Value::Number(n) => Data::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Data::String(s.clone()),
        serde_json::Value::Array(a) => Data::Array(a.iter().map(json_to_data).collect()),
        serde_json::Value::Object(o) => {
            Data::Map(o.iter().map(|(k, v)| (k.clone(), json_to_data(v))).collect())
        }
    }
}

fn print_active(session: &Session) {
    println!("Active: {}", session.active().join(", "));
}
