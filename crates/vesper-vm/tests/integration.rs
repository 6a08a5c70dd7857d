//! tests/integration.rs — end-to-end interpreter scenarios.
//!
//! Each test runs source through `Interpreter::interpret` against a
//! `CapturingOutput` and asserts on captured stdout/stderr plus the
//! three-way `InterpretResult`, the same surface `vesper run` exercises.

use indoc::indoc;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use vesper_core::error::InterpretResult;
use vesper_vm::{CapturingOutput, Interpreter, VmOptions};

fn run(source: &str) -> (InterpretResult, CapturingOutput) {
    let mut interpreter = Interpreter::new(VmOptions::default());
    let mut output = CapturingOutput::default();
    let result = interpreter.interpret(source, &mut output);
    (result, output)
}

fn run_with(source: &str, options: VmOptions) -> (InterpretResult, CapturingOutput) {
    let mut interpreter = Interpreter::new(options);
    let mut output = CapturingOutput::default();
    let result = interpreter.interpret(source, &mut output);
    (result, output)
}

#[test]
fn fibonacci_recursion() {
    let (result, output) = run(indoc! {r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        print fib(10);
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["55"]);
}

#[test]
fn string_concatenation_interns_equal_results() {
    let (result, output) = run(indoc! {r#"
        var a = "foo" + "bar";
        var b = "foo" + "bar";
        print a == b;
        print a;
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["true", "foobar"]);
}

#[test]
fn closures_capture_independent_counters() {
    let (result, output) = run(indoc! {r#"
        fun make() {
            var i = 0;
            fun counter() {
                i = i + 1;
                return i;
            }
            return counter;
        }
        var a = make();
        var b = make();
        print a();
        print a();
        print b();
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["1", "2", "1"]);
}

#[test]
fn for_loop_accumulates_sum() {
    let (result, output) = run(indoc! {r#"
        var sum = 0;
        for (var i = 1; i <= 5; i = i + 1) {
            sum = sum + i;
        }
        print sum;
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["15"]);
}

#[test]
fn while_loop_with_break_and_continue() {
    let (result, output) = run(indoc! {r#"
        var i = 0;
        var total = 0;
        while (i < 10) {
            i = i + 1;
            if (i == 3) continue;
            if (i == 7) break;
            total = total + i;
        }
        print total;
    "#});
    assert_eq!(result, InterpretResult::Ok);
    // 1 + 2 + 4 + 5 + 6 = 18 (3 skipped by `continue`, loop stops at 7).
    assert_eq!(output.stdout, vec!["18"]);
}

#[test]
fn undefined_variable_is_a_runtime_error() {
    let (result, output) = run(indoc! {r#"
        print missing;
    "#});
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(output.stdout.is_empty());
    assert_eq!(output.stderr.len(), 1);
    assert!(output.stderr[0].contains("Undefined variable 'missing'"));
}

#[test]
fn assigning_to_immutable_global_is_a_runtime_error() {
    let (result, output) = run(indoc! {r#"
        const limit = 10;
        limit = 20;
    "#});
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(output.stderr[0].contains("Can't assign to immutable variable 'limit'"));
}

#[test]
fn parse_error_reports_compile_error_without_running() {
    let (result, output) = run("print 1 +;");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

#[test]
fn wrong_arity_call_is_a_runtime_error() {
    let (result, output) = run(indoc! {r#"
        fun add(a, b) { return a + b; }
        add(1);
    "#});
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(output.stderr[0].contains("Expected 2 arguments but got 1"));
}

#[test]
fn switch_statement_falls_through_to_default() {
    let (result, output) = run(indoc! {r#"
        fun describe(n) {
            switch (n) {
                case 1:
                    print "one";
                case 2:
                    print "two";
                default:
                    print "other";
            }
        }
        describe(2);
        describe(5);
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["two", "other"]);
}

#[test]
fn repl_state_persists_across_interpret_calls() {
    let mut interpreter = Interpreter::new(VmOptions::default());
    let mut output = CapturingOutput::default();
    assert_eq!(interpreter.interpret("var x = 1;", &mut output), InterpretResult::Ok);
    assert_eq!(interpreter.interpret("x = x + 1;", &mut output), InterpretResult::Ok);
    assert_eq!(interpreter.interpret("print x;", &mut output), InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["2"]);
}

#[test]
fn native_clock_and_join_backed_interpolation() {
    let (result, output) = run(indoc! {r#"
        var name = "world";
        print "hello, ${name}!";
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["hello, world!"]);
}

#[test]
fn deep_recursion_overflows_the_frame_stack() {
    let (result, output) = run(indoc! {r#"
        fun recurse(n) { return recurse(n + 1); }
        recurse(0);
    "#});
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(output.stderr[0].contains("Stack overflow"));
}

#[test]
fn function_with_255_parameters_is_callable() {
    let params: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
    let args: Vec<String> = (0..255).map(|i| i.to_string()).collect();
    let source = format!(
        "fun sum({}) {{ return p0 + p254; }}\nprint sum({});",
        params.join(", "),
        args.join(", "),
    );
    let (result, output) = run(&source);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["254"]);
}

#[test]
fn stress_gc_does_not_corrupt_live_closures() {
    let mut interpreter = Interpreter::new(VmOptions::default().with_stress_gc(true));
    let mut output = CapturingOutput::default();
    let result = interpreter.interpret(
        indoc! {r#"
            fun make(n) {
                fun inner() { return n; }
                return inner;
            }
            var fns = make(1);
            print fns();
            var other = "garbage" + "collected";
            print other;
            print fns();
        "#},
        &mut output,
    );
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["1", "garbagecollected", "1"]);
}

#[test]
fn stack_and_frames_are_empty_after_a_successful_run() {
    // spec invariant 4: on Ok, the VM's own stack and call-frame vector must
    // have unwound completely. This crate's public surface doesn't expose a
    // `Vm` to peek at directly, so the positive half (it does unwind) is
    // checked here via repeated nested calls that would leave stack garbage
    // behind if `RETURN`'s truncation were ever off by a frame; the private
    // fields themselves are asserted directly in `vm::tests`.
    let (result, output) = run(indoc! {r#"
        fun inner(x) { return x * 2; }
        fun outer(x) { return inner(x) + inner(x); }
        var total = 0;
        var i = 0;
        while (i < 20) {
            total = total + outer(i);
            i = i + 1;
        }
        print total;
    "#});
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(output.stdout, vec!["760"]);
}

proptest! {
    /// Spec invariant 5: running the GC between any two instructions must
    /// not change observable output. `stress_gc` forces a collection before
    /// every allocation, the most aggressive schedule possible, so comparing
    /// stdout with it on vs. off against the same randomized program is a
    /// property test of that invariant.
    #[test]
    fn gc_stress_does_not_change_observable_output(n in 0i64..50, label in "[a-z]{1,8}") {
        let source = format!(
            "fun counter(start) {{\n  var value = start;\n  fun bump() {{ value = value + 1; return value; }}\n  return bump;\n}}\nvar c = counter({n});\nvar label = \"{label}\";\nvar i = 0;\nwhile (i < 5) {{\n  print label + \" \" + c();\n  i = i + 1;\n}}\n"
        );

        let (calm_result, calm_output) = run_with(&source, VmOptions::default());
        let (stressed_result, stressed_output) = run_with(&source, VmOptions::default().with_stress_gc(true));

        prop_assert_eq!(calm_result, stressed_result);
        prop_assert_eq!(calm_output.stdout, stressed_output.stdout);
    }
}
