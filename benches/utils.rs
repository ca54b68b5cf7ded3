#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "benchmark"
)]

use loquat::{Engine, Hash, RenderParameters, Scope, Value};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value as Json, json};

/// Profile pages with a handful of line items, seeded so every engine sees
/// the same data.
pub fn generate_random_contexts(n: usize) -> Vec<Json> {
    let mut rng = StdRng::seed_from_u64(42);

    (0..n)
        .map(|_| {
            let items: Vec<Json> = (0..rng.random_range(3..10))
                .map(|_| {
                    json!({
                        "name": random_string(&mut rng, 3, 8),
                        "value": rng.random_range(10..1000),
                        "special": rng.random_bool(0.3),
                    })
                })
                .collect();

            json!({
                "user": {
                    "name": random_string(&mut rng, 5, 10),
                    "age": rng.random_range(18..80),
                    "active": rng.random_bool(0.7),
                },
                "items": items,
                "show_details": rng.random_bool(0.8),
                "has_access": rng.random_bool(0.6),
            })
        })
        .collect()
}

fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> String {
    let len = rng.random_range(min_len..=max_len);
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26_u8)))
        .collect()
}

/// Converts generated JSON into template values without the `serde` feature.
fn to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(value) => Value::Bool(*value),
        Json::Number(number) => number
            .as_i64()
            .map_or_else(|| Value::Float(number.as_f64().unwrap_or_default()), Value::Int),
        Json::String(text) => Value::from(text.as_str()),
        Json::Array(items) => Value::Array(items.iter().map(to_value).collect()),
        Json::Object(map) => Value::Hash(
            map.iter()
                .map(|(key, value)| (key.clone(), to_value(value)))
                .collect::<Hash>(),
        ),
    }
}

pub const LOQUAT_SOURCE: &str = include_str!("template_loquat.liquid");

/// The profile page as loquat renders it, with the generated data converted
/// up front so only rendering is measured.
pub struct LoquatProfile {
    engine: Engine,
    scopes: Vec<Scope>,
}

impl LoquatProfile {
    pub fn new(contexts: &[Json]) -> Self {
        let mut engine = Engine::new();
        engine.add_template("profile", LOQUAT_SOURCE).unwrap();
        let scopes = contexts
            .iter()
            .map(|context| match to_value(context) {
                Value::Hash(hash) => Scope::from(hash),
                other => panic!("profile data must be an object, got {}", other.type_name()),
            })
            .collect();
        Self { engine, scopes }
    }

    pub fn render(&self, index: usize) -> String {
        let parameters = RenderParameters::new().locals(self.scopes[index].clone());
        self.engine.render("profile", parameters).unwrap()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }
}

/// Engines disagree on blank lines around block tags; the text between them
/// must match.
pub fn assert_same_page(engine: &str, theirs: &str, ours: &str) {
    let words = |page: &str| page.split_whitespace().map(str::to_string).collect::<Vec<_>>();
    assert_eq!(words(theirs), words(ours), "{engine} and loquat rendered different pages");
}

pub fn print_binary_size() {
    let binary_path = std::env::current_exe().unwrap();
    let size_bytes = std::fs::metadata(&binary_path).unwrap().len();
    let size_kb = size_bytes as f64 / 1024.0;

    println!(
        "Binary size: {:.2} MB ({size_kb:.2} KB, {size_bytes} bytes)",
        size_kb / 1024.0
    );
    println!("Binary path: {}", binary_path.display());
}
