#[cfg(feature = "serde")]
mod serde_tests {
    use loquat::{
        Engine, ErrorKind, Location, ParseError, ParseErrorKind, RenderParameters, Scope, Template,
        Value,
    };

    #[test]
    #[ntest::timeout(100)]
    fn test_value_from_json() {
        let value: Value = serde_json::from_str(
            r#"{"name": "Ann", "age": 31, "score": 2.5, "tags": ["a", "b"], "admin": false, "boss": null}"#,
        )
        .unwrap();
        let Value::Hash(hash) = &value else {
            panic!("expected a hash, got {value:?}");
        };
        assert_eq!(hash.get("name"), Some(&Value::from("Ann")));
        assert_eq!(hash.get("age"), Some(&Value::Int(31)));
        assert_eq!(hash.get("score"), Some(&Value::Float(2.5)));
        assert_eq!(hash.get("tags"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(hash.get("admin"), Some(&Value::Bool(false)));
        assert_eq!(hash.get("boss"), Some(&Value::Nil));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_value_to_json() {
        let value = Value::hash([
            ("items", Value::from(vec![1, 2])),
            ("title", Value::from("x")),
            ("missing", Value::Nil),
        ]);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"items":[1,2],"missing":null,"title":"x"}"#
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_json_data_renders() {
        let data: Value =
            serde_json::from_str(r#"{"products": [{"title": "Draft"}, {"title": "Board"}]}"#).unwrap();
        let Value::Hash(hash) = data else {
            panic!("expected a hash");
        };
        let template =
            Template::parse("{% for p in products %}{{ p.title }}{% unless forloop.last %}, {% endunless %}{% endfor %}")
                .unwrap();
        let output = template
            .render_with(RenderParameters::new().locals(Scope::from(hash)))
            .unwrap();
        assert_eq!(output, "Draft, Board");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_parse_error_serialization() {
        let error = ParseError::new(
            ParseErrorKind::UnknownTag {
                tag: "nope".to_string(),
            },
            Location { line: 2, column: 5 },
        );
        let serialized = serde_json::to_string(&error).unwrap();
        assert_eq!(
            serialized,
            r#"{"location":{"line":2,"column":5},"kind":{"UnknownTag":{"tag":"nope"}}}"#
        );
        let deserialized: ParseError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, error);

        let kind: ErrorKind = serde_json::from_str(r#""ResourceExhausted""#).unwrap();
        assert_eq!(kind, ErrorKind::ResourceExhausted);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_template_serialization() {
        let template = Template::parse("Hello, {{ name }}!").unwrap();

        let serialized = serde_json::to_string(&template).unwrap();
        assert_eq!(serialized, r#"{"source":"Hello, {{ name }}!"}"#);

        let deserialized: Template = serde_json::from_str(&serialized).unwrap();
        let parameters = RenderParameters::new().locals(Scope::new().with("name", "World"));
        assert_eq!(deserialized.render_with(parameters.clone()).unwrap(), "Hello, World!");
        assert_eq!(
            template.render_with(parameters).unwrap(),
            deserialized.render_with(RenderParameters::new().locals(Scope::new().with("name", "World"))).unwrap()
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_invalid_template_fails_to_deserialize() {
        let result = serde_json::from_str::<Template>(r#"{"source":"{% if %}"}"#);
        assert!(result.is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_engine_serialization() {
        let mut engine = Engine::new();
        engine.add_template("greeting", "Hello, {{ name }}!").unwrap();
        engine
            .add_template("page", "{% include 'greeting' %} {% for i in items %}{{ i }}{% endfor %}")
            .unwrap();

        let serialized = serde_json::to_string(&engine).unwrap();
        let deserialized: Engine = serde_json::from_str(&serialized).unwrap();

        let locals = Scope::new().with("name", "World").with("items", vec![1, 2, 3]);
        assert_eq!(
            engine.render("page", RenderParameters::new().locals(locals.clone())).unwrap(),
            deserialized.render("page", RenderParameters::new().locals(locals)).unwrap()
        );
        assert_eq!(deserialized.template_names().count(), 2);
    }
}
