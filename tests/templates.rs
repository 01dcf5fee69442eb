use indoc::indoc;
use mm::{Namespace, Record, RenderError, Template, TemplateError, Templates, Value};

fn template(src: &str) -> Template {
    Template::new(src).unwrap_or_else(|e| panic!("{src:?} failed to compile: {e}"))
}

/// Render and strip trailing whitespace, the way the checks below compare.
fn render(src: &str, args: &[Value]) -> String {
    let out = template(src)
        .render(args)
        .unwrap_or_else(|e| panic!("{src:?} failed to render: {e}"));
    out.to_string().trim_end().to_string()
}

fn render_kw(src: &str, args: &[Value], kwargs: &[(&str, Value)]) -> String {
    let kwargs: Vec<(String, Value)> = kwargs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    template(src)
        .call(args, &kwargs)
        .unwrap()
        .to_string()
        .trim_end()
        .to_string()
}

fn globals(pairs: &[(&str, Value)]) -> Namespace {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn ints(items: &[i64]) -> Value {
    Value::list(items.iter().map(|i| Value::Int(*i)).collect())
}

#[test]
fn parameters_and_defaults() {
    assert_eq!(render("$def with (a)\n$a", &["1".into()]), "1");
    assert_eq!(render("$def with (a=0)\n$a", &[]), "0");
    assert_eq!(render("$def with (a=0)\n$a", &[1.into()]), "1");
    assert_eq!(render_kw("$def with (a=0)\n$a", &[], &[("a", 1.into())]), "1");
    assert_eq!(render("$def with(x ,y)\n$x", &[1.into(), 1.into()]), "1");
}

#[test]
fn expressions() {
    let test_cases = vec![
        ("$(2 * 3 + 4 * 5)", "26"),
        ("${2 * 3 + 4 * 5}", "26"),
        ("$(1 + 2 * 3 + 4)", "11"),
        ("$(7 // 2) $(7 % 3) $(2 ** 3) $(7 / 2)", "3 1 8 3.5"),
        ("$('a' + 'b') $('ab' * 2)", "ab abab"),
        ("$(1 < 2 < 3) $(3 > 2 > 2)", "True False"),
        ("$(1 in [1, 2]) $('x' not in 'abc')", "True True"),
        ("$('yes' if 1 else 'no')", "yes"),
        ("$([1, 2, 3][-1]) $('hello'[1:3])", "3 el"),
        ("$({'a': 1}['a'])", "1"),
    ];

    for (src, expected) in test_cases {
        assert_eq!(render(src, &[]), expected, "{src}");
    }
}

#[test]
fn name_chains() {
    assert_eq!(render("$def with (x)\n$x.upper()", &["hello".into()]), "HELLO");
    assert_eq!(render("$def with (limit)\nkeep $(limit)ing.", &["go".into()]), "keep going.");

    let foo = Record::new("Foo").with("b", vec![Value::Int(1)]);
    assert_eq!(render("$def with (a)\n$a.b[0]", &[Value::object(foo)]), "1");
}

#[test]
fn conditionals() {
    let test_cases = vec![
        ("$if 1: 1", "1"),
        ("$if 1:\n    1", "1"),
        ("$if 1:\n    1\\", "1"),
        ("$if 0: 0\n$elif 1: 1", "1"),
        ("$if 0: 0\n$elif None: 0\n$else: 1", "1"),
        ("$if 0 < 1 and 1 < 2: 1", "1"),
        ("$if True: foo", "foo"),
        ("$if 0: 0\n$elif '': 0", ""),
    ];

    for (src, expected) in test_cases {
        assert_eq!(render(src, &[]), expected, "{src:?}");
    }
}

#[test]
fn loops() {
    assert_eq!(render("$for x in [1, 2, 3]: $x", &[]), "1\n2\n3");

    let d = Value::dict([(mm::Key::Int(1), Value::Int(1))]);
    assert_eq!(render("$def with (d)\n$for k, v in d.items(): $k", &[d]), "1");

    let a = ints(&[1, 2, 3]);
    assert_eq!(
        render("$def with (a)\n$while a and a.pop(): 1", &[a.clone()]),
        "1\n1\n1"
    );
    // the caller's list was consumed by the template
    assert_eq!(a, ints(&[]));

    assert_eq!(render("$for i in range(10)[1:5]:\n    $i", &[]), "1\n2\n3\n4");
    assert_eq!(
        render("$for k, v in {'a': 1, 'b': 2}.items():\n    $k $v", &[]),
        "a 1\nb 2"
    );
}

#[test]
fn loop_metadata() {
    assert_eq!(
        render("$for i in range(5):\n    $loop.index, $loop.parity", &[]),
        "1, odd\n2, even\n3, odd\n4, even\n5, odd"
    );
    assert_eq!(
        render(
            "$for i in range(2):\n    $for j in range(2): $loop.parent.parity, $loop.parity",
            &[]
        ),
        "odd, odd\nodd, even\neven, odd\neven, even"
    );
    assert_eq!(
        render("$ n = 3\n$while n:\n    $ n = n - 1\n    $loop.index0", &[]),
        "0\n1\n2"
    );
}

#[test]
fn assignments() {
    let test_cases = vec![
        ("$ a = 1\n$a", "1"),
        ("$ a = [1]\n$a[0]", "1"),
        ("$ a = {1: 1}\n$list(a.keys())[0]", "1"),
        ("$ a = []\n$if not a: 1", "1"),
        ("$ a = -1\n$a", "-1"),
        ("$ a = '1'\n$a", "1"),
        ("$ a, b = 'xy'\n$b$a", "yx"),
        ("$ a = [0]\n$ a[0] = 5\n$a", "[5]"),
    ];

    for (src, expected) in test_cases {
        assert_eq!(render(src, &[]), expected, "{src:?}");
    }
}

#[test]
fn comments() {
    assert_eq!(render("$# 0", &[]), "");
    assert_eq!(render("hello$# comment1\nhello$# comment2", &[]), "hello\nhello");
    // a comment-only line still ends its line
    let out = template("$# comment0\nhi$# comment1\nhi$#comment2").render(&[]).unwrap();
    assert_eq!(out.as_str(), "\nhi\nhi");
}

#[test]
fn unicode_and_raw_emits() {
    assert_eq!(render("$def with (a)\n$a $:a", &["\u{203d}".into()]), "\u{203d} \u{203d}");

    let identity = Value::function("identity", |args, _| {
        Ok(args.first().cloned().unwrap_or(Value::None))
    });
    assert_eq!(render("$def with (f)\n$:f('x')", &[identity]), "x");
}

#[test]
fn escaping() {
    assert_eq!(render("$$money", &[]), "$money");
    assert_eq!(
        render("$def with (a)\n$a|$:a", &["<b> & 'q'".into()]),
        "&lt;b&gt; &amp; &#39;q&#39;|<b> & 'q'"
    );
    assert_eq!(render("costs $5 and $ 6", &[]), "costs $5 and $ 6");
}

#[test]
fn literal_round_trip() {
    let text = indoc! {"
        <p>
          plain text, no sigils
            keeps its indentation
        </p>
    "};
    assert_eq!(template(text).render(&[]).unwrap().as_str(), text);

    let unterminated = "one\ntwo";
    assert_eq!(template(unterminated).render(&[]).unwrap().as_str(), unterminated);
}

#[test]
fn scoping() {
    assert_eq!(
        template("$x").render(&[]).unwrap_err(),
        RenderError::UnboundName("x".into())
    );

    let with_x = |src: &str| template(src).with_globals(globals(&[("x", 1.into())]));
    assert_eq!(
        with_x("$ x = x + 1\n$x").render(&[]).unwrap_err(),
        RenderError::UnboundLocal("x".into())
    );
    assert_eq!(with_x("$x").render(&[]).unwrap().as_str(), "1");
    assert_eq!(with_x("$ x = 2\n$x").render(&[]).unwrap().as_str(), "2");

    // parameters shadow globals of the same name
    let t = template("$def with (x)\n$x").with_globals(globals(&[("x", 1.into())]));
    assert_eq!(t.render(&[2.into()]).unwrap().as_str(), "2");

    // `var` only feeds the result, never the scope
    assert_eq!(
        template("$var x = 1\n$x").render(&[]).unwrap_err(),
        RenderError::UnboundName("x".into())
    );
}

#[test]
fn builtins() {
    assert_eq!(render("$min(1, 2)", &[]), "1");
    assert_eq!(
        template("$min(1, 2)").without_builtins().render(&[]).unwrap_err(),
        RenderError::UnboundName("min".into())
    );
    assert_eq!(
        render("$len('abc') $sum([1, 2]) $sorted([3, 1, 2]) $(', '.join(['a', 'b']))", &[]),
        "3 3 [1, 2, 3] a, b"
    );
}

#[test]
fn var_results() {
    let out = template("$var x: 1").render(&[]).unwrap();
    assert_eq!(out["x"], Value::str("1"));

    let out = template("$var x = 1").render(&[]).unwrap();
    assert_eq!(out["x"], Value::Int(1));
}

#[test]
fn byte_order_mark() {
    assert_eq!(render("\u{feff}$def with(x)\n$x", &["foo".into()]), "foo");
    assert_eq!(render("\u{ef}\u{bb}\u{bf}$def with(x)\n$x", &["foo".into()]), "foo");
}

#[test]
fn syntax_errors_at_compile_time() {
    let test_cases = vec![
        "$for k, v in ({'a': 1, 'b': 2}.items():\n    $k $v",
        "$(1 + )",
        "$if x\n    y",
        "$else: 1",
        "$def with (a)\n$def with (b)",
        "$var x:\n    block",
        "$for x in y:\nnot indented",
    ];

    for src in test_cases {
        assert!(Template::new(src).is_err(), "{src:?} should not compile");
    }
}

#[test]
fn render_errors_discard_output() {
    let t = template("first line\n$undefined_name\n");
    assert!(matches!(t.render(&[]), Err(RenderError::UnboundName(_))));

    let t = template("$def with (a)\nbody");
    assert!(matches!(t.render(&[]), Err(RenderError::Argument(_))));
    assert!(matches!(
        t.render(&[1.into(), 2.into()]),
        Err(RenderError::Argument(_))
    ));
}

#[test]
fn html_page() {
    let src = indoc! {r#"
        $def with (title, items)
        $var title: $title
        <h1>$title</h1>
        <ul>
        $for item in items:
            <li class="$loop.parity">$item</li>
        </ul>
    "#};
    let items = Value::list(vec!["apples".into(), "pears & plums".into()]);
    let out = template(src).render(&["Shop".into(), items]).unwrap();

    assert_eq!(
        out.as_str(),
        indoc! {r#"
            <h1>Shop</h1>
            <ul>
            <li class="odd">apples</li>
            <li class="even">pears &amp; plums</li>
            </ul>
        "#}
    );
    assert_eq!(out["title"], Value::str("Shop"));
}

#[test]
fn registry_renders_config_files() {
    let mut templates = Templates::new().with_globals(globals(&[("root", "/srv/www".into())]));
    templates
        .insert(
            "nginx",
            indoc! {"
                $def with (domain, port=80)
                server {
                    listen $port;
                    server_name $domain;
                    root $root/$domain;
                }
            "},
        )
        .unwrap();

    let out = templates.render("nginx", &["example.org".into()]).unwrap();
    assert_eq!(
        out.as_str(),
        indoc! {"
            server {
                listen 80;
                server_name example.org;
                root /srv/www/example.org;
            }
        "}
    );

    assert!(matches!(
        templates.render("apache", &[]),
        Err(TemplateError::Render(RenderError::Lookup(_)))
    ));

#[test]
fn oversized_operands_fail_cleanly() {
    assert_eq!(render("$([1, 2, 3][2::9223372036854775807])", &[]), "[3]");
    assert_eq!(render("$len(range(9223372036854775806, 9223372036854775807, 5))", &[]), "1");
    assert_eq!(render("$({1: 'a'}[True])", &[]), "a");
    assert_eq!(render("$ a = []\n$ a.append(a)\n$a", &[]), "[[...]]");
    assert_eq!(render("$ a = [[1]]\n$ a.append(a)\n$a.count(a)", &[]), "1");

    let test_cases = vec![
        "$len([1, 2] * 9223372036854775807)",
        "$len('ab' * 9223372036854775807)",
        "$len(range(10 ** 12))",
        "$round(float('nan'))",
        "$ a = [[1]]\n$a.index(a)",
        "$sorted([[1, 'a'], [0], [1, 2]])",
    ];
    for src in test_cases {
        assert!(template(src).render(&[]).is_err(), "{src:?} should fail to render");
    }
}
}
