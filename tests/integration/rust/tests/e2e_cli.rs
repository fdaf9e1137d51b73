//! End-to-end CLI tests
//!
//! Parses command lines exactly as the binary does and executes them
//! through a session.

use clap::Parser;
use core_types::Value;
use interp_cli::{Cli, CliError, Command, Session};
use interpreter::{CallOutcome, InterpreterConfig};

/// Parse `interp <args>` with the binary's parser.
fn parse(args: &[&str]) -> Command {
    let mut argv = vec!["interp"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

fn session() -> Session {
    Session::new(InterpreterConfig::default()).unwrap()
}

#[test]
fn e2e_every_demo_runs() {
    let session = session();
    let cases: [(&[&str], CallOutcome); 4] = [
        (&["run", "sum", "10"], CallOutcome::Returned(Value::Int(55))),
        (&["run", "fib", "12"], CallOutcome::Returned(Value::Int(144))),
        (&["run", "divide", "-9", "2"], CallOutcome::Returned(Value::Int(-4))),
        (&["run", "native", "7"], CallOutcome::Returned(Value::Int(49))),
    ];
    for (args, expected) in cases {
        let Command::Run(run) = parse(args) else {
            panic!("expected run");
        };
        assert_eq!(session.run(&run).unwrap().outcome, expected, "{:?}", args);
    }
}

#[test]
fn e2e_run_prints_result_and_diagnostics() {
    let output = session()
        .execute(&parse(&["run", "sum", "4", "--count-bytecodes", "--histogram"]))
        .unwrap();
    assert!(output.starts_with("demo/Main.sum(4) = 10\n"), "{}", output);
    assert!(output.contains("bytecodes executed: "));
    assert!(output.contains("iadd"));
}

#[test]
fn e2e_divide_by_zero_is_caught_by_the_guest() {
    let output = session().execute(&parse(&["run", "divide"])).unwrap();
    assert_eq!(output, "demo/Main.divide(7, 0) = -1\n");
}

#[test]
fn e2e_stubs_and_disassembly() {
    let session = session();
    let listing = session.execute(&parse(&["stubs"])).unwrap();
    assert!(listing.contains("method entry point"));
    let text = session.execute(&parse(&["disassemble", "stubs"])).unwrap();
    assert!(text.contains("----- call stub"));
    let err = session.execute(&parse(&["disassemble", "nowhere"])).unwrap_err();
    assert!(matches!(err, CliError::UnknownCode(_)));
}

#[test]
fn e2e_flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interp.json");
    std::fs::write(&path, r#"{ "max_steps": 100 }"#).unwrap();
    let session = Session::from_config_file(Some(&path)).unwrap();

    // the file's budget is far too small for the loop
    let Command::Run(run) = parse(&["run", "sum", "1000"]) else {
        panic!("expected run");
    };
    assert!(matches!(session.run(&run), Err(CliError::Vm(_))));

    let Command::Run(run) = parse(&["run", "sum", "1000", "--max-steps", "10000000"]) else {
        panic!("expected run");
    };
    assert_eq!(
        session.run(&run).unwrap().outcome,
        CallOutcome::Returned(Value::Int(500_500))
    );
}
