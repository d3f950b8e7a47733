//! Artifact templates (tinytemplate). Contexts carry preformatted lines; templates only lay them out.

use crate::error::CodegenError;
use serde::Serialize;
use tinytemplate::TinyTemplate;

pub const TABLES: &str = "tables";
pub const SCHEMAS: &str = "schemas";
pub const ROUTER: &str = "router";
pub const ROUTERS_MOD: &str = "routers_mod";

static TABLES_TEMPLATE: &str = r#"-- Tables for the registered models. Apply with psql or ensure_tables().
{{ for table in tables }}
CREATE TABLE IF NOT EXISTS {table.qualified_name} (
{{ for line in table.lines }}    {line}
{{ endfor }});
{{ endfor }}"#;

static SCHEMAS_TEMPLATE: &str = r#"//! Request and response schemas for the registered models.

use serde::\{Deserialize, Serialize};
{{ for s in structs }}
/// {s.doc}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct {s.name} \{
{{ for line in s.lines }}    {line}
{{ endfor }}}
{{ endfor }}"#;

static ROUTER_TEMPLATE: &str = r#"//! Routes for {entity}.

use axum::Router;
use scaffold_sdk::\{entity_router, AppState};

pub const ENTITY: &str = "{entity}";
pub const PREFIX: &str = "/{snake_name}";

/// (name, method, url, response schema)
pub const ROUTES: &[(&str, &str, &str, &str)] = &[
{{ for line in routes }}    {line}
{{ endfor }}];

/// Router for {entity}, relative to `PREFIX`.
pub fn router(state: &AppState) -> Option<Router<AppState>> \{
    state.routers.iter().find(|m| m.entity == ENTITY).map(entity_router)
}
"#;

static ROUTERS_MOD_TEMPLATE: &str = r#"//! Generated routers, one module per entity.

use axum::Router;
use scaffold_sdk::AppState;
{{ for m in modules }}
pub mod {m};{{ endfor }}

/// Every entity router nested under its prefix.
pub fn router(state: AppState) -> Router \{
    let mut router = Router::new();
{{ for m in modules }}    if let Some(r) = {m}::router(&state) \{
        router = router.nest({m}::PREFIX, r);
    }
{{ endfor }}    router.with_state(state)
}
"#;

#[derive(Serialize)]
pub struct TableContext {
    pub qualified_name: String,
    pub lines: Vec<String>,
}

#[derive(Serialize)]
pub struct TablesContext {
    pub tables: Vec<TableContext>,
}

#[derive(Serialize)]
pub struct StructContext {
    pub name: String,
    pub doc: String,
    pub lines: Vec<String>,
}

#[derive(Serialize)]
pub struct SchemasContext {
    pub structs: Vec<StructContext>,
}

#[derive(Serialize)]
pub struct RouterContext {
    pub entity: String,
    pub snake_name: String,
    pub routes: Vec<String>,
}

#[derive(Serialize)]
pub struct RoutersModContext {
    pub modules: Vec<String>,
}

/// All artifact templates, registered once.
pub struct Templates {
    tt: TinyTemplate<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, CodegenError> {
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template(TABLES, TABLES_TEMPLATE)?;
        tt.add_template(SCHEMAS, SCHEMAS_TEMPLATE)?;
        tt.add_template(ROUTER, ROUTER_TEMPLATE)?;
        tt.add_template(ROUTERS_MOD, ROUTERS_MOD_TEMPLATE)?;
        Ok(Templates { tt })
    }

    pub fn render<C: Serialize>(&self, name: &str, ctx: &C) -> Result<String, CodegenError> {
        Ok(self.tt.render(name, ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_template_keeps_braces_and_lines() {
        let t = Templates::new().unwrap();
        let out = t
            .render(
                SCHEMAS,
                &SchemasContext {
                    structs: vec![StructContext {
                        name: "VideoSchema".into(),
                        doc: "Video row.".into(),
                        lines: vec!["pub id: uuid::Uuid,".into(), "pub title: Option<String>,".into()],
                    }],
                },
            )
            .unwrap();
        assert!(out.contains("use serde::{Deserialize, Serialize};"));
        assert!(out.contains("pub struct VideoSchema {\n    pub id: uuid::Uuid,\n    pub title: Option<String>,\n}"));
    }

    #[test]
    fn table_template_is_unescaped() {
        let t = Templates::new().unwrap();
        let out = t
            .render(
                TABLES,
                &TablesContext {
                    tables: vec![TableContext {
                        qualified_name: r#""public"."__table_name_video""#.into(),
                        lines: vec![r#""id" UUID NOT NULL,"#.into(), r#"PRIMARY KEY ("id")"#.into()],
                    }],
                },
            )
            .unwrap();
        assert!(out.contains(
            "CREATE TABLE IF NOT EXISTS \"public\".\"__table_name_video\" (\n    \"id\" UUID NOT NULL,\n    PRIMARY KEY (\"id\")\n);"
        ));
    }
}
