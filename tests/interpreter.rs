use hyacinth::{
    diagnostics::{HyacinthError, SourceSpan},
    environment::Environment,
    runtime::Interpreter,
    value::Value,
};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> HyacinthError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn expect_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        _ => panic!("expected Number, found {}", value.type_name()),
    }
}

fn expect_str(value: &Value) -> &str {
    match value {
        Value::Str(s) => s,
        _ => panic!("expected String, found {}", value.type_name()),
    }
}

#[test]
fn evaluates_basic_arithmetic() {
    let value = eval("2 + 2 * 10");
    assert_eq!(expect_number(&value), 22.0);
}

#[test]
fn returns_last_expression_from_script() {
    let value = eval(
        r#"
        x = 40
        x + 2
        "#,
    );
    assert_eq!(expect_number(&value), 42.0);
}

#[test]
fn concatenates_strings() {
    let value = eval(r#""answer: " + "42""#);
    assert_eq!(expect_str(&value), "answer: 42");
}

#[test]
fn adding_a_string_and_a_number_is_a_type_error() {
    let err = eval_error(r#""answer: " + 42"#);
    assert!(err.to_string().contains("cannot add"), "got: {err}");
}

#[test]
fn nil_and_zero_are_falsey() {
    assert_eq!(expect_number(&eval("not nil")), 1.0);
    assert_eq!(expect_number(&eval("not 0")), 1.0);
    assert_eq!(expect_number(&eval("not 3")), 0.0);
    assert_eq!(expect_number(&eval(r#"not """#)), 0.0);
}

#[test]
fn coalesce_picks_first_non_nil() {
    assert_eq!(expect_number(&eval("nil ?? 5")), 5.0);
    assert_eq!(expect_number(&eval("1 ?? 5")), 1.0);
}

#[test]
fn plain_bindings_are_immutable() {
    let err = eval_error(
        r#"
        x = 1
        x = 2
        "#,
    );
    assert!(err.to_string().contains("immutable"), "got: {err}");
}

#[test]
fn dollar_marker_allows_reassignment() {
    let value = eval(
        r#"
        $x = 1
        $x = $x + 1
        $x
        "#,
    );
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn inner_scope_shadows_outer_binding() {
    let parent = Environment::new();
    parent.borrow_mut().define("x", Value::Number(1.0));
    let child = Environment::with_parent(parent.clone());
    child.borrow_mut().define("x", Value::Number(2.0));

    let span = SourceSpan::new(0, 0);
    let inner = Environment::get(&child, "x", span).expect("child lookup");
    let outer = Environment::get(&parent, "x", span).expect("parent lookup");
    assert_eq!(expect_number(&inner), 2.0);
    assert_eq!(expect_number(&outer), 1.0);
}

#[test]
fn direct_addressed_lookup_targets_the_exact_scope() {
    let root = Environment::new();
    root.borrow_mut().define("x", Value::Number(1.0));
    let middle = Environment::with_parent(root.clone());
    middle.borrow_mut().define("x", Value::Number(2.0));
    let leaf = Environment::with_parent(middle.clone());

    let span = SourceSpan::new(0, 0);
    let one_up = Environment::get_at(&leaf, 1, "x").expect("binding at distance 1");
    let two_up = Environment::get_at(&leaf, 2, "x").expect("binding at distance 2");
    assert_eq!(expect_number(&one_up), 2.0);
    assert_eq!(expect_number(&two_up), 1.0);

    Environment::assign_at(&leaf, 2, "$y", Value::Number(9.0), span).expect("assign at root");
    let rooted = Environment::get_at(&leaf, 2, "$y").expect("binding created at root");
    assert_eq!(expect_number(&rooted), 9.0);
    assert!(Environment::ancestor(&leaf, 3).is_none());
}

#[test]
fn scalars_copy_on_assignment() {
    let value = eval(
        r#"
        $a = 1
        $b = $a
        $b = 2
        $a
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn objects_alias_on_assignment() {
    let value = eval(
        r#"
        first = $[x = 1]
        second = first
        second.x = 99
        first.x
        "#,
    );
    assert_eq!(expect_number(&value), 99.0);
}

#[test]
fn methods_resolve_through_single_parent() {
    let value = eval(
        r#"
        class Animal {
            init(name) { self.name = name }
            speak() { return self.name + " makes a sound" }
        }
        class Dog(Animal) {
            speak() { return self.name + " barks" }
        }
        Dog("Rex").speak()
        "#,
    );
    assert_eq!(expect_str(&value), "Rex barks");
}

#[test]
fn first_listed_parent_wins_resolution() {
    let value = eval(
        r#"
        class A { who() { return "A" } }
        class B { who() { return "B" } }
        class C(A, B) { }
        C().who()
        "#,
    );
    assert_eq!(expect_str(&value), "A");
}

#[test]
fn overloads_select_by_exact_arity() {
    let value = eval(
        r#"
        class Greeter {
            greet() { return "hi" }
            greet(name) { return "hi " + name }
        }
        Greeter().greet("Bob")
        "#,
    );
    assert_eq!(expect_str(&value), "hi Bob");
}

#[test]
fn nearest_arity_fallback_drops_surplus_arguments() {
    let value = eval(
        r#"
        class Fmt {
            show(a) { return a }
        }
        Fmt().show(7, 8, 9)
        "#,
    );
    assert_eq!(expect_number(&value), 7.0);
}

#[test]
fn nearest_arity_picks_closest_declared_arity_below_request() {
    let value = eval(
        r#"
        class Picker {
            m() { return "zero" }
            m(a) { return "one" }
            m(a, b, c) { return "three" }
        }
        Picker().m(1, 2)
        "#,
    );
    assert_eq!(expect_str(&value), "one");
}

#[test]
fn exact_match_in_superclass_beats_local_fallback() {
    let value = eval(
        r#"
        class Base {
            m(a, b) { return "base" }
        }
        class Derived(Base) {
            m(a) { return "derived" }
        }
        Derived().m(1, 2)
        "#,
    );
    assert_eq!(expect_str(&value), "base");
}

#[test]
fn super_dispatches_to_parent_method() {
    let value = eval(
        r#"
        class Animal {
            init(name) { self.name = name }
            describe() { return "animal " + self.name }
        }
        class Dog(Animal) {
            describe() { return super.describe() + "!" }
        }
        Dog("Rex").describe()
        "#,
    );
    assert_eq!(expect_str(&value), "animal Rex!");
}

#[test]
fn class_constants_are_readable() {
    let value = eval(
        r#"
        class Circle {
            pi = 3
            area(r) { return Circle.pi * r * r }
        }
        Circle.pi + Circle().area(2)
        "#,
    );
    assert_eq!(expect_number(&value), 15.0);
}

#[test]
fn raise_unwinds_to_following_rescue() {
    let value = eval(
        r#"
        risky = || {
            raise Exception("boom")
            return "unreached"
        }
        $result = "none"
        out = risky()
        rescue |e| { $result = e.message }
        $result
        "#,
    );
    assert_eq!(expect_str(&value), "boom");
}

#[test]
fn rescue_reached_inline_binds_nil() {
    let value = eval(
        r#"
        rescue |e| { e == nil }
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn unhandled_exception_surfaces_as_error() {
    let err = eval_error(r#"raise Exception("bad state")"#);
    assert!(
        err.to_string().contains("unhandled exception: bad state"),
        "got: {err}"
    );
}

#[test]
fn raise_inside_loop_halts_iteration() {
    let value = eval(
        r#"
        $count = 0
        for n in [1, 2, 3] {
            $count = $count + 1
            if n == 2 { raise Exception("stop") }
        }
        rescue |e| { }
        $count
        "#,
    );
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn for_loop_accumulates_sum() {
    let value = eval(
        r#"
        $sum = 0
        for n in [1, 2, 3] {
            $sum = $sum + n
        }
        $sum
        "#,
    );
    assert_eq!(expect_number(&value), 6.0);
}

#[test]
fn for_loop_uses_custom_next_method() {
    let value = eval(
        r#"
        class Countdown {
            init(start) { self.remaining = start }
            next() {
                if self.remaining == 0 { return nil }
                self.remaining = self.remaining - 1
                return self.remaining + 1
            }
        }
        $total = 0
        for n in Countdown(3) {
            $total = $total + n
        }
        $total
        "#,
    );
    assert_eq!(expect_number(&value), 6.0);
}

#[test]
fn while_loop_honors_break_and_continue() {
    let value = eval(
        r#"
        $i = 0
        $sum = 0
        while 1 {
            $i = $i + 1
            if $i > 5 { break }
            if $i % 2 == 0 { continue }
            $sum = $sum + $i
        }
        $sum
        "#,
    );
    assert_eq!(expect_number(&value), 9.0);
}

#[test]
fn break_outside_loop_is_an_error() {
    let err = eval_error("break");
    assert!(err.to_string().contains("outside a loop"), "got: {err}");
}

#[test]
fn object_literals_use_implicit_positional_keys() {
    let value = eval(
        r#"
        pair = ["a", "b"]
        pair._0 + pair.1
        "#,
    );
    assert_eq!(expect_str(&value), "ab");
}

#[test]
fn immutable_literal_rejects_mutation() {
    let err = eval_error(
        r#"
        pair = ["a"]
        pair._0 = "c"
        "#,
    );
    assert!(err.to_string().contains("immutable object"), "got: {err}");
}

#[test]
fn mutable_literal_accepts_mutation() {
    let value = eval(
        r#"
        obj = $[x = 1]
        obj.x = 2
        obj.x
        "#,
    );
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn computed_member_access_evaluates_key() {
    let value = eval(
        r#"
        obj = [name = "hy"]
        obj.("na" + "me")
        "#,
    );
    assert_eq!(expect_str(&value), "hy");
}

#[test]
fn equality_dispatches_user_equals() {
    let value = eval(
        r#"
        class Point {
            init(x) { self.x = x }
            equals(other) { return self.x == other.x }
        }
        Point(1) == Point(1)
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn comparison_dispatches_compare_to() {
    let value = eval(
        r#"
        class Money {
            init(amount) { self.amount = amount }
            compareTo(other) { return self.amount <> other.amount }
        }
        Money(5) > Money(3)
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn is_operator_checks_class_membership() {
    assert_eq!(expect_number(&eval("1 is Number")), 1.0);
    assert_eq!(expect_number(&eval("1 is Object")), 1.0);
    assert_eq!(expect_number(&eval(r#""s" is String"#)), 1.0);
    assert_eq!(expect_number(&eval(r#"1 isnot String"#)), 1.0);

    let value = eval(
        r#"
        class Animal { }
        class Dog(Animal) { }
        Dog() is Animal
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn in_operator_checks_membership() {
    assert_eq!(expect_number(&eval("2 in [1, 2, 3]")), 1.0);
    assert_eq!(expect_number(&eval("5 notin [1, 2, 3]")), 1.0);
    assert_eq!(expect_number(&eval(r#""ell" in "hello""#)), 1.0);
}

#[test]
fn closures_capture_their_defining_scope() {
    let value = eval(
        r#"
        make_counter = || {
            $n = 0
            return || {
                $n = $n + 1
                return $n
            }
        }
        counter = make_counter()
        counter()
        counter()
        "#,
    );
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn block_arity_mismatch_is_an_error() {
    let err = eval_error(
        r#"
        f = |a, b| { return a }
        f(1)
        "#,
    );
    assert!(err.to_string().contains("argument"), "got: {err}");
}

#[test]
fn undefined_variable_is_an_error() {
    let err = eval_error("missing");
    assert!(err.to_string().contains("undefined variable"), "got: {err}");
}

#[test]
fn clock_returns_a_positive_number() {
    let value = eval("clock()");
    assert!(expect_number(&value) > 0.0);
}
