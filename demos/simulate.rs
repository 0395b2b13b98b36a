use thompviz::{build_nfa, test_string, FA};

fn main() {
    let regex = "(a|b)*abb";

    let nfa = build_nfa(regex).unwrap();

    println!(
        "Built an NFA with {} states for {}, accepting in {:?}",
        nfa.get_num_states(),
        regex,
        nfa.get_acceptor_states()
    );

    for input in ["abb", "aabb", "abab", ""] {
        let result = test_string(&nfa, input);
        println!(
            "{:?} accepted: {} after visiting {:?}",
            input,
            result.is_accepted(),
            result.get_path()
        );
    }
}
