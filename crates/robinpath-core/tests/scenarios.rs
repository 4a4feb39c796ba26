//! End-to-end program scenarios: parse + run a whole source string and
//! assert on the resulting environment, mirroring how a consumer actually
//! drives the crate rather than exercising the parser or executor alone.

use robinpath_core::error::Flow;
use robinpath_core::exec::{Executor, Program};
use robinpath_core::host::{CallArgs, Host};
use robinpath_core::parser::parse;
use robinpath_core::value::Value;

fn math_add(args: CallArgs) -> Flow<Value> {
    let a = args.get(0).and_then(Value::as_number).unwrap_or(0.0);
    let b = args.get(1).and_then(Value::as_number).unwrap_or(0.0);
    Ok(Value::Number(a + b))
}

async fn run(source: &str, host: &Host) -> (Executor<'_>, Value) {
    let ast = parse(source).expect("source should parse");
    let program = Program::from_ast(ast);
    let mut executor = Executor::new(host, program.functions.clone());
    let result = executor.run(&program).await.expect("program should run");
    (executor, result)
}

#[tokio::test]
async fn together_with_into_settles_both_targets() {
    let host = Host::new();
    let source = "$x = 0\n$y = 0\ntogether\n  do into $x\n    1\n  enddo\n  do into $y\n    2\n  enddo\nendtogether\n";
    let (executor, _) = run(source, &host).await;
    let x = executor.env().get_path("x", None, Default::default()).unwrap();
    let y = executor.env().get_path("y", None, Default::default()).unwrap();
    assert_eq!(x.as_number(), Some(1.0));
    assert_eq!(y.as_number(), Some(2.0));
}

#[tokio::test]
async fn subexpression_reads_callers_local() {
    let mut host = Host::new();
    host.register_builtin("math.add", math_add);
    let source = "def f\n  $k = 10\n  return $(math.add $k 5)\nenddef\nf into $result\n";
    let (executor, _) = run(source, &host).await;
    let result = executor.env().get_path("result", None, Default::default()).unwrap();
    assert_eq!(result.as_number(), Some(15.0));
}

#[tokio::test]
async fn for_loop_preserves_last_value_on_zero_iterations() {
    let host = Host::new();
    let source = "$items = []\n$x = 99\nfor $i in $items\n  $x = 1\nendfor\n";
    let (executor, _) = run(source, &host).await;
    assert_eq!(executor.env().last_value().as_number(), Some(99.0));
}

#[tokio::test]
async fn for_loop_has_no_frame_of_its_own() {
    let host = Host::new();
    let source = "$items = [1, 2, 3]\nfor $i in $items\n  $last = $i\nendfor\n";
    let (executor, _) = run(source, &host).await;
    let last = executor.env().get_path("last", None, Default::default()).unwrap();
    assert_eq!(last.as_number(), Some(3.0));
    assert_eq!(executor.env().last_value().as_number(), Some(3.0));
}

#[tokio::test]
async fn const_reassignment_fails() {
    let host = Host::new();
    let source = "const $pi = 3\n$pi = 4\n";
    let ast = parse(source).unwrap();
    let program = Program::from_ast(ast);
    let mut executor = Executor::new(&host, program.functions.clone());
    let err = executor.run(&program).await.unwrap_err();
    assert!(matches!(
        err,
        robinpath_core::error::ControlFlow::Error(e)
            if matches!(e.kind, robinpath_core::error::RuntimeErrorKind::Immutable(_))
    ));
}

#[tokio::test]
async fn isolated_do_block_does_not_leak_without_into() {
    let host = Host::new();
    let source = "do $p\n  $local = $p\nenddo\n";
    let ast = parse(source).unwrap();
    let program = Program::from_ast(ast);
    let mut executor = Executor::new(&host, program.functions.clone());
    executor.run(&program).await.unwrap();
    assert!(executor.env().get_path("local", None, Default::default()).is_err());
}

#[tokio::test]
async fn function_call_binds_positional_slots_named_override_and_args_bag() {
    let host = Host::new();
    let source = "\
def greet $name
  return $1
enddef
greet \"ada\" into $first

def whoami $name
  return $name
enddef
whoami name=\"bob\" into $overridden

def bag
  return $args
enddef
bag x=1 y=2 into $collected
";
    let (executor, _) = run(source, &host).await;
    let first = executor.env().get_path("first", None, Default::default()).unwrap();
    let overridden = executor.env().get_path("overridden", None, Default::default()).unwrap();
    let collected = executor.env().get_path("collected", None, Default::default()).unwrap();
    assert_eq!(first.as_str(), Some("ada"));
    assert_eq!(overridden.as_str(), Some("bob"));
    match collected {
        Value::Object(o) => {
            let map = o.borrow();
            assert_eq!(map.get("x").and_then(Value::as_number), Some(1.0));
            assert_eq!(map.get("y").and_then(Value::as_number), Some(2.0));
        }
        other => panic!("expected $args to bind an object, got {other:?}"),
    }
}

#[tokio::test]
async fn meta_get_meta_and_explain_round_trip_by_target_kind() {
    let host = Host::new();
    let source = "\
$x = 1
meta $x unit seconds
getMeta $x unit into $unit

meta greet doc \"says hi\"
getMeta greet doc into $doc
explain greet into $record
";
    let (executor, _) = run(source, &host).await;
    let unit = executor.env().get_path("unit", None, Default::default()).unwrap();
    let doc = executor.env().get_path("doc", None, Default::default()).unwrap();
    let record = executor.env().get_path("record", None, Default::default()).unwrap();
    assert_eq!(unit.as_str(), Some("seconds"));
    assert_eq!(doc.as_str(), Some("says hi"));
    match record {
        Value::Object(o) => assert_eq!(o.borrow().get("doc").and_then(Value::as_str), Some("says hi")),
        other => panic!("expected explain to return a metadata record, got {other:?}"),
    }
}

#[tokio::test]
async fn thread_commands_delegate_to_host_registry() {
    let host = Host::new();
    let source = "\
thread create worker into $id
thread list into $before
thread close $id
thread list into $after
";
    let (executor, _) = run(source, &host).await;
    let id = executor.env().get_path("id", None, Default::default()).unwrap();
    let before = executor.env().get_path("before", None, Default::default()).unwrap();
    let after = executor.env().get_path("after", None, Default::default()).unwrap();
    assert!(id.as_number().is_some());
    match before {
        Value::Array(a) => assert_eq!(a.borrow().len(), 1),
        other => panic!("expected an array of active threads, got {other:?}"),
    }
    match after {
        Value::Array(a) => assert!(a.borrow().is_empty()),
        other => panic!("expected an array of active threads, got {other:?}"),
    }
}

#[tokio::test]
async fn bare_name_dispatches_by_first_argument_type() {
    let mut host = Host::new();
    host.register_builtin("array.length", |args: CallArgs| {
        let n = match args.get(0) {
            Some(Value::Array(a)) => a.borrow().len(),
            _ => 0,
        };
        Ok(Value::Number(n as f64))
    });
    host.register_builtin("string.length", |args: CallArgs| {
        let n = args.get(0).and_then(Value::as_str).map(str::len).unwrap_or(0);
        Ok(Value::Number(n as f64))
    });
    let source = "$items = [1, 2, 3]\nlength $items into $count\n$word = \"abcd\"\nlength $word into $len\n";
    let (executor, _) = run(source, &host).await;
    let count = executor.env().get_path("count", None, Default::default()).unwrap();
    let len = executor.env().get_path("len", None, Default::default()).unwrap();
    assert_eq!(count.as_number(), Some(3.0));
    assert_eq!(len.as_number(), Some(4.0));
}
