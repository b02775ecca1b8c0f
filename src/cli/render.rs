//! Render a marking template or formula with ad-hoc values.

use anyhow::Result;
use clap::Args;
use serde_json::{Map, Value};

use super::CliConfig;
use crate::constants::NORMALIZED_PREFIX;
use crate::core::CatalogError;
use crate::snapshot::CatalogSnapshot;
use crate::templating::{MarkingCompiler, MarkingRenderer, auto_wrap, normalize_designation};

/// Render a template against values given on the command line.
///
/// Values are parsed as JSON when possible (`3`, `2.5`, `true`) and taken as
/// text otherwise.
#[derive(Args)]
pub struct RenderCommand {
    /// Template text, e.g. "FHD {{ d }}x{{ <detail_HDH>.m }}"
    pub template: String,

    /// Parameter value
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub params: Vec<(String, Value)>,

    /// Child component value; ALIAS is `category_designation`
    #[arg(long = "child", value_name = "ALIAS.FIELD=VALUE", value_parser = parse_key_value)]
    pub children: Vec<(String, Value)>,

    /// Treat TEMPLATE as a bare formula expression
    #[arg(long)]
    pub formula: bool,
}

impl RenderCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::TemplateRender`] when rendering fails.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine_config = config.engine_config().await?;
        let renderer = MarkingRenderer::from_config(&engine_config.cache);
        let context = self.context()?;

        let template = if self.formula {
            auto_wrap(&self.template)
        } else {
            self.template.clone()
        };
        // No attributes are bound, so no catalog is ever consulted.
        let catalogs = CatalogSnapshot::default();
        let compiler = MarkingCompiler::new(&renderer, &catalogs, &[]).with_extra_context(context);
        let rendered = compiler.compile(&template, &Map::new()).map_err(|e| CatalogError::TemplateRender {
            message: e.to_string(),
        })?;
        println!("{rendered}");
        Ok(())
    }

    /// Rendering context: parameters, then one bag per child alias.
    fn context(&self) -> Result<Map<String, Value>, CatalogError> {
        let mut context: Map<String, Value> = self.params.iter().cloned().collect();

        for (key, value) in &self.children {
            let Some((alias, field)) = key.rsplit_once('.') else {
                return Err(CatalogError::Other {
                    message: format!("Child value '{key}' must be written as ALIAS.FIELD=VALUE"),
                });
            };
            let alias = if alias.starts_with(NORMALIZED_PREFIX) {
                alias.to_string()
            } else {
                normalize_designation(alias)
            };
            let bag = context.entry(alias).or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(bag) = bag {
                bag.insert(field.to_string(), value.clone());
            }
        }
        Ok(context)
    }
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s.split_once('=').ok_or_else(|| format!("'{s}' is not KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("'{s}' has an empty key"));
    }
    let value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
