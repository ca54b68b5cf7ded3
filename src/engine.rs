use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::context::Context;
use crate::error::{LoquatError, LoquatResult};
use crate::file_system::FileSystem;
use crate::template::{RenderParameters, Template};

/// A set of named templates that can include and extend one another.
///
/// Partials and layouts are the registered templates themselves, parsed
/// once and shared by every render that reaches them.
///
/// ```
/// use loquat::{Engine, RenderParameters, Scope};
///
/// let mut engine = Engine::new();
/// engine.add_template("greeting", "Hello, {{ name }}!").unwrap();
/// engine.add_template("page", "<p>{% include 'greeting' %}</p>").unwrap();
///
/// let params = RenderParameters::new().locals(Scope::new().with("name", "World"));
/// assert_eq!(engine.render("page", params).unwrap(), "<p>Hello, World!</p>");
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    config: Arc<Config>,
    templates: Arc<Templates>,
}

/// The registered templates, doubling as the file system of a render.
#[derive(Debug, Clone, Default)]
struct Templates(HashMap<String, Arc<Template>>);

impl FileSystem for Templates {
    fn read_template_file(&self, _: &Context, template_name: &str) -> LoquatResult<String> {
        self.0
            .get(template_name)
            .map(|template| template.source().to_string())
            .ok_or_else(|| LoquatError::MissingTemplate {
                template_name: template_name.to_string(),
            })
    }

    fn parsed_template(&self, _: &Context, template_name: &str) -> Option<Arc<Template>> {
        self.0.get(template_name).cloned()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(Config::shared())
    }

    pub fn with_config(config: Arc<Config>) -> Self {
        Self {
            config,
            templates: Arc::default(),
        }
    }

    /// Parses and registers a template.
    ///
    /// # Errors
    ///
    /// * [`LoquatError::TemplateExists`] if `name` is already registered.
    /// * [`LoquatError::Syntax`] if the source does not parse.
    pub fn add_template(&mut self, name: impl AsRef<str>, source: impl AsRef<str>) -> LoquatResult<()> {
        let name = name.as_ref();
        if self.templates.0.contains_key(name) {
            return Err(LoquatError::TemplateExists {
                template_name: name.to_string(),
            });
        }

        let template = Template::parse_with(source.as_ref(), Arc::clone(&self.config))?;
        Arc::make_mut(&mut self.templates)
            .0
            .insert(name.to_string(), Arc::new(template));
        tracing::debug!(template = name, "registered template");
        Ok(())
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.0.get(name).map(AsRef::as_ref)
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.0.keys().map(String::as_str)
    }

    /// Renders a registered template. `include` and `extends` resolve
    /// against the registered templates unless the parameters' registers
    /// carry their own file system.
    ///
    /// # Errors
    ///
    /// * [`LoquatError::MissingTemplate`] if `name` is not registered.
    /// * Any render error when `rethrow_errors` is set.
    pub fn render(&self, name: &str, mut parameters: RenderParameters) -> LoquatResult<String> {
        let template = self
            .templates
            .0
            .get(name)
            .ok_or_else(|| LoquatError::MissingTemplate {
                template_name: name.to_string(),
            })?;

        let registers = parameters.registers.get_or_insert_with(Default::default);
        if registers.file_system().is_none() {
            let templates: Arc<Templates> = Arc::clone(&self.templates);
            registers.set_file_system(templates);
        }
        template.render_with(parameters)
    }
}

/// Serialized as the template sources, keyed by name. The configuration is
/// not part of the data; deserialized engines use the shared default.
#[cfg(feature = "serde")]
impl serde::Serialize for Engine {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let templates: std::collections::BTreeMap<&str, &str> = self
            .templates
            .0
            .iter()
            .map(|(name, template)| (name.as_str(), template.source()))
            .collect();
        let mut state = serializer.serialize_struct("Engine", 1)?;
        state.serialize_field("templates", &templates)?;
        state.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Engine {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct EngineHelper {
            templates: std::collections::BTreeMap<String, String>,
        }

        let helper = EngineHelper::deserialize(deserializer)?;
        let mut engine = Self::new();
        for (name, source) in helper.templates {
            engine
                .add_template(&name, &source)
                .map_err(|e| serde::de::Error::custom(format!("Failed to parse template '{name}': {e}")))?;
        }
        Ok(engine)
    }
}
