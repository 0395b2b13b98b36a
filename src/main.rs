use clap::{Arg, Command};
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;

use thompviz::{build_nfa, test_string, FA};

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = Command::new("thompviz")
        .version("0.1")
        .about("Compile a regular expression into an NFA with Thompson Construction and test strings against it")
        .arg(
            Arg::new("regex")
                .short('r')
                .long("regex")
                .value_name("REGEX")
                .help("Regular expression over literals, |, * and parentheses")
                .value_parser(clap::value_parser!(String))
                .required(true),
        )
        .arg(
            Arg::new("input")
                .short('s')
                .long("input")
                .value_name("STRING")
                .help("A string to test against the automaton. May be given several times")
                .action(clap::ArgAction::Append)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("save-nfa")
                .short('n')
                .long("save-nfa")
                .value_name("DOT FILE")
                .help("Save a Graphviz description of the constructed NFA")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Print the automaton and the test results as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let regex = args
        .get_one::<String>("regex")
        .ok_or_else(|| eyre!("Error: A regular expression must be provided!"))?;

    let inputs: Vec<String> = args
        .get_many::<String>("input")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let nfa = build_nfa(regex)?;

    if let Some(dot_path) = args.get_one::<PathBuf>("save-nfa") {
        nfa.save_dot(dot_path)?;
    }

    let results: Vec<_> = inputs
        .iter()
        .map(|input| (input, test_string(&nfa, input)))
        .collect();

    if args.get_flag("json") {
        let tests: Vec<serde_json::Value> = results
            .iter()
            .map(|(input, result)| {
                serde_json::json!({
                    "input": input,
                    "result": result,
                })
            })
            .collect();
        let output = serde_json::json!({
            "automaton": nfa,
            "tests": tests,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "NFA for {:?}: {} states, {} transitions, start q{}, accept {:?}",
        nfa.get_regex(),
        nfa.get_num_states(),
        nfa.get_transitions().len(),
        nfa.get_start_state(),
        nfa.get_acceptor_states()
    );

    for (input, result) in results {
        let verdict = if result.is_accepted() {
            "accepted"
        } else {
            "rejected"
        };
        println!("{:?} is {} via path {:?}", input, verdict, result.get_path());
    }

    Ok(())
}
