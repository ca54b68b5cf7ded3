
use std::sync::{Arc, LazyLock};

use fixtures::{
    config, file_system, generate_random_whitespace, generate_random_whitespace_at_least_one,
    locals, render,
};
use loquat::{
    BodyEnd, CSharpNamingConvention, Config, Context, Engine, ErrorKind, LiquidDrop,
    LocalFileSystem, LoquatError, LoquatResult, MemberTable, Parser, ParseError, Registers,
    RenderParameters, SafeTypeRegistry, Scope, Tag, TagHeader, Template, Value,
};

struct ProductDrop;

static PRODUCT_MEMBERS: LazyLock<MemberTable<ProductDrop>> = LazyLock::new(|| {
    MemberTable::<ProductDrop>::new()
        .property("Title", |_, _| Ok(Value::from("Snowboard")))
        .property("ProductID", |_, _| Ok(Value::from(42)))
        .method("TopSales", |_, _| Err(LoquatError::syntax("worked")))
        .method("Texts", |_, _| Ok(Value::from(vec!["text1", "text2"])))
});

impl LiquidDrop for ProductDrop {
    fn declared_member(&self, name: &str, context: &mut Context) -> Option<LoquatResult<Value>> {
        PRODUCT_MEMBERS.resolve(self, name, context)
    }
}

/// Exposes the render context to templates.
struct ContextDrop;

static CONTEXT_MEMBERS: LazyLock<MemberTable<ContextDrop>> = LazyLock::new(|| {
    MemberTable::<ContextDrop>::new()
        .property("Scopes", |_, context| Ok(Value::from(context.scopes().len())))
        .method("LoopPos", |_, context| context.resolve("forloop.index"))
});

impl LiquidDrop for ContextDrop {
    fn declared_member(&self, name: &str, context: &mut Context) -> Option<LoquatResult<Value>> {
        CONTEXT_MEMBERS.resolve(self, name, context)
    }

    fn before_member(&self, name: &str, context: &mut Context) -> LoquatResult<Value> {
        context.resolve(name)
    }
}

struct CatchAllDrop;

impl LiquidDrop for CatchAllDrop {
    fn before_member(&self, name: &str, _context: &mut Context) -> LoquatResult<Value> {
        Ok(Value::from(format!("method: {name}")))
    }
}

struct EnumerableDrop;

impl LiquidDrop for EnumerableDrop {
    fn to_sequence(&self, _context: &mut Context) -> Option<Vec<Value>> {
        Some(vec![Value::from(1), Value::from(2), Value::from(3)])
    }
}

fn with_drops() -> Scope {
    Scope::new()
        .with("product", Value::from_drop(ProductDrop))
        .with("context", Value::from_drop(ContextDrop))
        .with("catchall", Value::from_drop(CatchAllDrop))
        .with("collection", Value::from_drop(EnumerableDrop))
}

#[test]
#[ntest::timeout(100)]
fn test_basic_substitution() {
    let template = format!(
        "Hello, {{{{{}name{}}}}}!",
        generate_random_whitespace(),
        generate_random_whitespace()
    );
    assert_eq!(render(&template, Scope::new().with("name", "Jessica")), "Hello, Jessica!");
}

#[test]
#[ntest::timeout(100)]
fn test_basic_iteration() {
    let template = format!(
        "{{%{}for{}cat{}in{}cats{}%}}Greetings {{{{{}cat{}}}}}\n{{%{}endfor{}%}}",
        generate_random_whitespace(),
        generate_random_whitespace_at_least_one(),
        generate_random_whitespace_at_least_one(),
        generate_random_whitespace_at_least_one(),
        generate_random_whitespace_at_least_one(),
        generate_random_whitespace(),
        generate_random_whitespace(),
        generate_random_whitespace(),
        generate_random_whitespace(),
    );
    let cats = vec!["Fluffy", "Whiskers", "Mittens"];
    assert_eq!(
        render(&template, Scope::new().with("cats", cats)),
        "Greetings Fluffy\nGreetings Whiskers\nGreetings Mittens\n"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_whitespace_control() {
    assert_eq!(render("a  {%- if true -%}  b  {%- endif -%}  c", Scope::new()), "abc");
    assert_eq!(render("<p>\n  {{- name -}}\n</p>", Scope::new().with("name", "x")), "<p>x</p>");
    assert_eq!(render("a {% if true %} b {% endif %} c", Scope::new()), "a  b  c");
}

#[test]
#[ntest::timeout(100)]
fn test_literal_shorthand() {
    assert_eq!(render("{{{ {{ x }} }}}", Scope::new()), "{{ x }}");
    assert_eq!(render("{{{a}}}}", Scope::new()), "a}");
}

#[test]
#[ntest::timeout(100)]
fn test_drop_members() {
    assert_eq!(render("{{ product.title }}", with_drops()), "Snowboard");
    assert_eq!(render("{{ product.product_id }}", with_drops()), "42");
    assert_eq!(render("{{ product.texts.size }}", with_drops()), "2");
    assert_eq!(
        render("{% for text in product.texts %}{{ text }} {% endfor %}", with_drops()),
        "text1 text2 "
    );
    assert_eq!(render("{{ product.unknown }}", with_drops()), "");
    assert_eq!(render("[{{ product }}]", with_drops()), "[]");
}

#[test]
#[ntest::timeout(100)]
fn test_drop_suggests_snake_case_name() {
    assert_eq!(
        render("{{ product.ProductID }}", with_drops()),
        "Missing property. Did you mean 'product_id'?"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_drop_errors_render_inline() {
    assert_eq!(
        render("{{ product.top_sales }}", with_drops()),
        "Liquid syntax error: worked"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_scopes_are_restored_after_errors() {
    assert_eq!(
        render(
            "{% for i in (1..1) %}{{ product.top_sales }}{% endfor %}{{ context.scopes }}",
            with_drops()
        ),
        "Liquid syntax error: worked1"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_context_drop() {
    assert_eq!(render("{{ context.scopes }}", with_drops()), "1");
    assert_eq!(
        render("{% for i in (1..2) %}{{ context.scopes }}{% endfor %}", with_drops()),
        "22"
    );
    assert_eq!(render("{% if true %}{{ context.scopes }}{% endif %}", with_drops()), "1");
    assert_eq!(
        render("{% for i in (1..3) %}{{ context.loop_pos }}{% endfor %}", with_drops()),
        "123"
    );
    assert_eq!(render("{{ context.bar }}", with_drops().with("bar", "carrot")), "carrot");
}

#[test]
#[ntest::timeout(100)]
fn test_catch_all_and_enumerable_drops() {
    assert_eq!(render("{{ catchall.unknown }}", with_drops()), "method: unknown");
    assert_eq!(
        render("{% for c in collection %}{{ c }}{% endfor %}", with_drops()),
        "123"
    );
    assert_eq!(render("{{ collection[1] }}", with_drops()), "2");
}

#[test]
#[ntest::timeout(100)]
fn test_csharp_naming_convention() {
    let config = Arc::new(Config::default().with_naming_convention(CSharpNamingConvention));
    let template = Template::parse_with("{{ product.Title }}|{{ product.title }}", config).unwrap();
    let output = template
        .render_with(RenderParameters::new().locals(with_drops()))
        .unwrap();
    assert_eq!(output, "Snowboard|");
}

struct Person {
    name: String,
    #[expect(dead_code, reason = "never exposed to templates")]
    secret: String,
}

struct Money(i64);

fn safe_type_config() -> Arc<Config> {
    let mut safe_types = SafeTypeRegistry::new();
    safe_types
        .register::<Person>()
        .member("name", |person| Value::from(person.name.clone()));
    safe_types
        .register::<Money>()
        .transform(|money| Value::from(format!("${}", money.0)));
    Arc::new(Config::default().with_safe_types(safe_types))
}

#[test]
#[ntest::timeout(100)]
fn test_safe_types() {
    let template = Template::parse_with(
        "{{ person.name }}[{{ person.secret }}][{{ person }}] {{ price }} [{{ other }}]",
        safe_type_config(),
    )
    .unwrap();
    let person = Person {
        name: "Ann".to_string(),
        secret: "hidden".to_string(),
    };
    let scope = Scope::new()
        .with("person", Value::object(person))
        .with("price", Value::object(Money(5)))
        .with("other", Value::object(7_u8));
    let output = template
        .render_with(RenderParameters::new().locals(scope))
        .unwrap();
    assert_eq!(output, "Ann[][] $5 []");
}

#[test]
#[ntest::timeout(100)]
fn test_strict_variables() {
    let config = Arc::new(Config::default().with_strict_variables(true));
    let template = Template::parse_with("{{ test }}", config).unwrap();
    assert_eq!(template.render().unwrap(), "Liquid error: Unknown variable 'test'");

    let template = Template::parse("{{ test }}").unwrap();
    let error = template
        .render_with(
            RenderParameters::new()
                .locals(Scope::strict())
                .rethrow_errors(true),
        )
        .unwrap_err();
    assert_eq!(error.to_string(), "Unknown variable 'test'");
    assert_eq!(error.kind(), ErrorKind::Runtime);
}

#[test]
#[ntest::timeout(100)]
fn test_rethrow_stops_at_first_error() {
    let template = Template::parse("{% for i in (1..3) %}{{ i | nope }}{% endfor %}").unwrap();
    let error = template
        .render_with(RenderParameters::new().rethrow_errors(true))
        .unwrap_err();
    assert_eq!(error.to_string(), "Error - Filter 'nope' could not be found");
    assert_eq!(template.errors().len(), 1);

    assert_eq!(
        template.render().unwrap(),
        "Liquid error: Error - Filter 'nope' could not be found".repeat(3)
    );
    assert_eq!(template.errors().len(), 3);
}

#[test]
#[ntest::timeout(100)]
fn test_include_variants() {
    let product = Value::hash([("title", "Draft 151cm")]);
    assert_eq!(
        render("{% include 'product' with item %}", Scope::new().with("item", product.clone())),
        "Product: Draft 151cm "
    );
    assert_eq!(
        render("{% include 'product' for items %}", Scope::new().with("items", vec![product.clone(), product])),
        "Product: Draft 151cm Product: Draft 151cm "
    );
    assert_eq!(
        render("{% include 'nested_template' %}", Scope::new()),
        "header body body_detail footer"
    );
    assert_eq!(render("{% include 'undefined' %}", Scope::new()), "|");
    assert_eq!(
        render(
            "{% include name %}",
            locals([("name", Value::from("cart")), ("cart", Value::hash([("items", vec![1, 2])]))])
        ),
        "1 2 "
    );
}

#[test]
#[ntest::timeout(100)]
fn test_include_for_walks_sequence_drops() {
    assert_eq!(render("{% include 'item' for collection %}", with_drops()), "[1][2][3]");
    assert_eq!(
        render("{% for item in collection %}{% include 'item' %}{% endfor %}", with_drops()),
        "[1][2][3]"
    );
    assert_eq!(render("{% include 'item' for catchall %}", with_drops()), "[]");
}

#[test]
#[ntest::timeout(100)]
fn test_include_from_local_file_system() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("shop")).unwrap();
    std::fs::write(dir.path().join("shop").join("_item.liquid"), "item {{ item }}").unwrap();

    let config = Arc::new(Config::default().with_file_system(LocalFileSystem::new(dir.path())));
    let template = Template::parse_with(
        "{% include 'shop/item' with 'one' %}|{% include '../escape' %}",
        config,
    )
    .unwrap();
    assert_eq!(
        template.render().unwrap(),
        "item one|Liquid error: Illegal template name '../escape'"
    );
    assert_eq!(template.errors()[0].kind(), ErrorKind::FileSystem);
}

#[test]
#[ntest::timeout(100)]
fn test_inheritance() {
    assert_eq!(
        render(
            "{% extends 'two_column' %}{% block title %}T{% endblock %}{% block left %}L{% endblock %}",
            Scope::new()
        ),
        "<html>T|<l>L</l><r>R</r></html>"
    );
    assert_eq!(
        render(
            "{% extends 'two_column' %}{% block right %}[{{ block.super }}]{% endblock %}",
            Scope::new()
        ),
        "<html>Untitled|<l></l><r>[R]</r></html>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_one_parsed_layout_serves_many_children() {
    let mut engine = Engine::with_config(config());
    engine
        .add_template("layout", "<h1>{% block title %}Untitled{% endblock %}</h1>{% block body %}-{% endblock %}")
        .unwrap();
    engine
        .add_template("about", "{% extends 'layout' %}{% block title %}About{% endblock %}")
        .unwrap();
    engine
        .add_template("news", "{% extends 'layout' %}{% block body %}[{{ block.super }}news]{% endblock %}")
        .unwrap();

    let page = |name: &str| engine.render(name, RenderParameters::new()).unwrap();
    assert_eq!(page("about"), "<h1>About</h1>-");
    assert_eq!(page("news"), "<h1>Untitled</h1>[-news]");
    assert_eq!(page("about"), "<h1>About</h1>-");
    assert_eq!(page("layout"), "<h1>Untitled</h1>-");
}

#[test]
#[ntest::timeout(100)]
fn test_shared_context_carries_stateful_tags_across_renders() {
    let cycle = Template::parse("{% cycle 'odd', 'even' %}").unwrap();
    let changed = Template::parse("{% ifchanged %}{{ x }}{% endifchanged %}").unwrap();

    let mut context = Context::new(Config::shared()).with_environment(Scope::new().with("x", 1));
    assert_eq!(cycle.render_in(&mut context).unwrap(), "odd");
    assert_eq!(cycle.render_in(&mut context).unwrap(), "even");
    assert_eq!(changed.render_in(&mut context).unwrap(), "1");
    assert_eq!(changed.render_in(&mut context).unwrap(), "");
    assert_eq!(cycle.render_in(&mut context).unwrap(), "odd");
    assert_eq!(context.scopes().len(), 1);

    assert_eq!(cycle.render().unwrap(), "odd");
    assert_eq!(cycle.render().unwrap(), "odd");
}

#[test]
#[ntest::timeout(100)]
fn test_large_and_empty_ranges() {
    assert_eq!(
        render("{% for i in (1..300000000) limit:2 %}{{ i }}{% endfor %}", Scope::new()),
        "12"
    );
    assert_eq!(
        render(
            "{% for i in (1..n) offset:99999998 %}{{ i }} {% endfor %}",
            Scope::new().with("n", 100_000_000)
        ),
        "99999999 100000000 "
    );
    assert_eq!(
        render("{% for i in (1..0) limit:2 %}{{ i }}{% else %}empty{% endfor %}", Scope::new()),
        "empty"
    );
    assert_eq!(
        render("{% for i in (1..3) offset:5 %}{{ i }}{% else %}empty{% endfor %}", Scope::new()),
        "empty"
    );
    assert_eq!(
        render("{% assign r = (1..300000000) %}[{{ r.size }}]", Scope::new()),
        "Liquid error: Range (1..300000000) is too long to expand[]"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_stateful_tags_in_loops() {
    assert_eq!(
        render("{% for i in (1..4) %}{% cycle 'odd', 'even' %} {% endfor %}", Scope::new()),
        "odd even odd even "
    );
    assert_eq!(
        render(
            "{% for i in list %}{% ifchanged %}<{{ i }}>{% endifchanged %}{% endfor %}",
            Scope::new().with("list", vec![1, 1, 2, 1])
        ),
        "<1><2><1>"
    );
    assert_eq!(
        render(
            "{% for i in (1..3) %}{% capture line %}{{ line }}{{ i }}{% endcapture %}{% endfor %}[{{ line }}]",
            Scope::new()
        ),
        "[]"
    );
    assert_eq!(
        render(
            "{% capture total %}{% for i in (1..3) %}{{ i }}{% endfor %}{% endcapture %}[{{ total }}]",
            Scope::new()
        ),
        "[123]"
    );
}

#[derive(Debug)]
struct ShoutTag {
    text: String,
}

fn parse_shout(header: &TagHeader<'_>, parser: &mut Parser<'_>) -> Result<Box<dyn Tag>, ParseError> {
    let (body, end) = parser.parse_body(Some("shout"), &[])?;
    assert_eq!(end, BodyEnd::EndTag);
    let text = format!("{}{}", header.markup, body.len());
    Ok(Box::new(ShoutTag { text }))
}

impl Tag for ShoutTag {
    fn name(&self) -> &str {
        "shout"
    }

    fn render(&self, _context: &mut Context, out: &mut String) -> LoquatResult<()> {
        out.push_str(&self.text.to_uppercase());
        Ok(())
    }
}

#[test]
#[ntest::timeout(100)]
fn test_custom_tags() {
    let config = Arc::new(Config::default().with_tag("shout", parse_shout));
    let template = Template::parse_with("{% shout hey %}a{{ b }}{% endshout %}", config).unwrap();
    assert_eq!(template.render().unwrap(), "HEY2");

    let error = Template::parse("{% shout hey %}{% endshout %}").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Syntax);
    assert_eq!(error.to_string(), "Unknown tag 'shout' (line 1, column 1)");
}

#[test]
#[ntest::timeout(100)]
fn test_custom_number_parser() {
    fn comma_decimal(text: &str) -> Option<Value> {
        text.replace(',', ".").parse::<f64>().ok().map(Value::Float)
    }
    let config = Arc::new(Config::default().with_number_parser(comma_decimal));
    let template = Template::parse_with("{{ 1,5 }}", config).unwrap();
    assert_eq!(template.render().unwrap(), "1.5");
}

#[test]
#[ntest::timeout(100)]
fn test_engine_shares_templates() {
    let mut engine = Engine::with_config(config());
    engine
        .add_template("row", "<td>{{ row }}</td>")
        .unwrap();
    engine
        .add_template("table", "{% include 'row' for rows %}|{% include 'header' %}")
        .unwrap();
    let output = engine
        .render("table", RenderParameters::new().locals(Scope::new().with("rows", vec![1, 2])))
        .unwrap();
    assert_eq!(output, "<td>1</td><td>2</td>|Liquid error: Template not found: header");

    let registers = Registers::new().with_file_system(file_system());
    let output = engine
        .render("table", RenderParameters::new().registers(registers).locals(Scope::new().with("rows", vec![3])))
        .unwrap();
    assert_eq!(output, "Liquid error: Template not found: row|header");
}
