//! Artifact generation: table DDL, serde schemas and axum routers for every registered entity.

use crate::codegen::templates::{
    RouterContext, RoutersModContext, SchemasContext, StructContext, TableContext, TablesContext, Templates, ROUTER,
    ROUTERS_MOD, SCHEMAS, TABLES,
};
use crate::codegen::writer::{CodeWriter, CommentMarker, WriteOutcome};
use crate::config::{resolve, EntitySpec, ModelRegistry, RelationshipSide, ResolvedModel};
use crate::error::{CodegenError, ConfigError};
use crate::metadata::{RouteDescriptor, RouteKind, RouterMetadata};
use crate::sql::{table_defs, CREATED_AT, UPDATED_AT};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "inner_code";

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub output_dir: PathBuf,
    /// Schema qualifying the tables in `tables.sql`.
    pub schema: String,
}

impl GeneratorConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        GeneratorConfig {
            output_dir: output_dir.into(),
            schema: "public".to_string(),
        }
    }

    /// `SCAFFOLD_OUTPUT_DIR` (default `inner_code`) and `SCAFFOLD_SCHEMA` (default `public`).
    pub fn from_env() -> Self {
        let output_dir = std::env::var("SCAFFOLD_OUTPUT_DIR").unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string());
        GeneratorConfig {
            output_dir: PathBuf::from(output_dir),
            schema: crate::store::runtime_schema(),
        }
    }
}

/// Paths touched by one generation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl GenerationReport {
    fn record(&mut self, path: PathBuf, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written.push(path),
            WriteOutcome::Unchanged => self.unchanged.push(path),
        }
    }

    pub fn merge(&mut self, other: GenerationReport) {
        self.written.extend(other.written);
        self.unchanged.extend(other.unchanged);
    }

    pub fn total(&self) -> usize {
        self.written.len() + self.unchanged.len()
    }
}

/// Strict and reserved keywords that are valid as raw identifiers. `self`, `Self`, `super` and
/// `crate` cannot be raw and are rejected at registration.
const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do", "dyn", "else", "enum",
    "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "macro", "match", "mod",
    "move", "mut", "override", "priv", "pub", "ref", "return", "static", "struct", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

fn ident(name: &str) -> String {
    if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

const DATETIME: &str = "chrono::DateTime<chrono::Utc>";

/// (name, rust type, nullable in rows, may be omitted on create) for every column.
fn schema_columns(entity: &EntitySpec) -> Vec<(String, &'static str, bool, bool)> {
    let mut out: Vec<_> = entity
        .fields
        .iter()
        .map(|f| {
            (
                f.name().to_string(),
                f.value_type().rust_type(),
                f.is_optional() && !f.is_primary_key(),
                f.may_be_omitted(),
            )
        })
        .collect();
    for (name, fk) in &entity.fk {
        out.push((name.clone(), fk.references.value_type().rust_type(), true, true));
    }
    for ts in [CREATED_AT, UPDATED_AT] {
        if entity.field(ts).is_none() {
            out.push((ts.to_string(), DATETIME, false, true));
        }
    }
    out
}

fn schema_structs(model: &ResolvedModel, entity: &EntitySpec, meta: &RouterMetadata) -> Vec<StructContext> {
    let base = entity.base_schema_name();
    let cols = schema_columns(entity);
    let generated = |c: &str| entity.field(c).is_none() && (c == CREATED_AT || c == UPDATED_AT);

    let row_lines = cols
        .iter()
        .map(|(n, t, nullable, _)| {
            if *nullable {
                format!("pub {}: Option<{}>,", ident(n), t)
            } else {
                format!("pub {}: {},", ident(n), t)
            }
        })
        .collect();
    let create_lines = cols
        .iter()
        .filter(|(n, ..)| !generated(n))
        .map(|(n, t, _, omit)| {
            if *omit {
                format!("pub {}: Option<{}>,", ident(n), t)
            } else {
                format!("pub {}: {},", ident(n), t)
            }
        })
        .collect();
    let update_lines = cols
        .iter()
        .filter(|(n, ..)| !generated(n))
        .filter(|(n, ..)| !entity.field(n).is_some_and(|f| f.is_primary_key()))
        .map(|(n, t, ..)| format!("#[serde(default, skip_serializing_if = \"Option::is_none\")] pub {}: Option<{}>,", ident(n), t))
        .collect();

    let route_url = |routes: Vec<&RouteDescriptor>| {
        routes.first().map(|r| format!("/{}{}", meta.snake_name, r.url)).unwrap_or_default()
    };
    let mut out = vec![
        StructContext {
            name: base.clone(),
            doc: format!("{} row as returned by every route.", entity.name),
            lines: row_lines,
        },
        StructContext {
            name: format!("{}Create", entity.name),
            doc: format!("Body of `POST {}`.", route_url(meta.create_routes())),
            lines: create_lines,
        },
        StructContext {
            name: format!("{}Update", entity.name),
            doc: format!("Body of `PUT {}`; absent fields are left unchanged.", route_url(meta.update_routes())),
            lines: update_lines,
        },
    ];
    for combo in &meta.combinations {
        let mut lines = vec![format!("#[serde(flatten)] pub base: {},", base)];
        for edge in &combo.edges {
            let target = model
                .entity(&edge.target)
                .map(|t| t.base_schema_name())
                .unwrap_or_else(|| format!("{}Schema", edge.target));
            let ty = match edge.side {
                RelationshipSide::One => format!("Option<{}>", target),
                RelationshipSide::Many | RelationshipSide::Both => format!("Vec<{}>", target),
            };
            lines.push(format!("pub {}: {},", ident(&edge.include_key()), ty));
        }
        out.push(StructContext {
            name: format!("{}With{}", entity.name, combo.name),
            doc: format!("{} with {} embedded.", entity.name, combo.targets().collect::<Vec<_>>().join(", ")),
            lines,
        });
    }
    out
}

fn route_lines(entity: &EntitySpec, meta: &RouterMetadata) -> Vec<String> {
    meta.routes
        .iter()
        .map(|r| {
            let schema = match (&r.kind, &r.schema_suffix) {
                (RouteKind::Query { .. }, Some(suffix)) => format!("{}{}", entity.name, suffix),
                _ => entity.base_schema_name(),
            };
            format!("(\"{}\", \"{}\", \"{}\", \"{}\"),", r.name, r.method, r.url, schema)
        })
        .collect()
}

pub struct CodeGenerator {
    config: GeneratorConfig,
    writer: CodeWriter,
    model: Option<ResolvedModel>,
    routers: Vec<RouterMetadata>,
}

impl CodeGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        CodeGenerator {
            config,
            writer: CodeWriter::new(),
            model: None,
            routers: Vec::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Resolves the registry and builds route metadata; replaces any earlier parse.
    pub fn parse(&mut self, registry: &ModelRegistry) -> Result<&ResolvedModel, ConfigError> {
        let model = resolve(registry)?;
        self.routers = model.router_metadata()?;
        Ok(self.model.insert(model))
    }

    pub fn model(&self) -> Option<&ResolvedModel> {
        self.model.as_ref()
    }

    pub fn routers(&self) -> &[RouterMetadata] {
        &self.routers
    }

    fn parsed(&self) -> Result<&ResolvedModel, CodegenError> {
        self.model
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("no models parsed; call parse() first".into()).into())
    }

    fn emit(&self, report: &mut GenerationReport, rel: &Path, content: &str) -> Result<(), CodegenError> {
        let path = self.config.output_dir.join(rel);
        let outcome = self.writer.write_if_changed(&path, content, CommentMarker::for_path(&path))?;
        report.record(path, outcome);
        Ok(())
    }

    /// `tables.sql`: entity tables (FK targets first), then link tables.
    pub fn generate_tables(&self) -> Result<GenerationReport, CodegenError> {
        let model = self.parsed()?;
        let ctx = TablesContext {
            tables: table_defs(model, &self.config.schema)?
                .into_iter()
                .map(|t| TableContext {
                    qualified_name: t.qualified_name,
                    lines: t.lines,
                })
                .collect(),
        };
        let content = Templates::new()?.render(TABLES, &ctx)?;
        let mut report = GenerationReport::default();
        self.emit(&mut report, Path::new("tables.sql"), &content)?;
        Ok(report)
    }

    /// `schemas.rs`: row, create, update and one `With...` struct per relationship combination.
    pub fn generate_schemas(&self) -> Result<GenerationReport, CodegenError> {
        let model = self.parsed()?;
        let structs = model
            .entities
            .iter()
            .zip(&self.routers)
            .flat_map(|(e, meta)| schema_structs(model, e, meta))
            .collect();
        let content = Templates::new()?.render(SCHEMAS, &SchemasContext { structs })?;
        let mut report = GenerationReport::default();
        self.emit(&mut report, Path::new("schemas.rs"), &content)?;
        Ok(report)
    }

    /// `routers/{snake}.rs` per entity plus `routers/mod.rs`.
    pub fn generate_routers(&self) -> Result<GenerationReport, CodegenError> {
        let model = self.parsed()?;
        let templates = Templates::new()?;
        let mut report = GenerationReport::default();
        for (entity, meta) in model.entities.iter().zip(&self.routers) {
            let ctx = RouterContext {
                entity: entity.name.clone(),
                snake_name: meta.snake_name.clone(),
                routes: route_lines(entity, meta),
            };
            let content = templates.render(ROUTER, &ctx)?;
            self.emit(&mut report, &Path::new("routers").join(format!("{}.rs", meta.snake_name)), &content)?;
        }
        let ctx = RoutersModContext {
            modules: self.routers.iter().map(|m| ident(&m.snake_name)).collect(),
        };
        let content = templates.render(ROUTERS_MOD, &ctx)?;
        self.emit(&mut report, Path::new("routers/mod.rs"), &content)?;
        Ok(report)
    }

    pub fn generate_all(&self) -> Result<GenerationReport, CodegenError> {
        let mut report = self.generate_tables()?;
        report.merge(self.generate_schemas()?);
        report.merge(self.generate_routers()?);
        tracing::info!(
            output_dir = %self.config.output_dir.display(),
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            "generation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultFactory, EntityDecl, FieldSpec, LinkDeclaration, StorageType, ValueType};

    fn registry() -> ModelRegistry {
        let id = || FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid).primary_key().default_factory(DefaultFactory::NewUuid);
        ModelRegistry::from_decls([
            EntityDecl::new("Video")
                .field(id())
                .field(FieldSpec::new("type", ValueType::String, StorageType::Text).optional()),
            EntityDecl::new("Sentence")
                .field(id())
                .field(FieldSpec::new("text", ValueType::String, StorageType::Text))
                .link(LinkDeclaration::one_to_many("Video", "Sentence")),
        ])
        .unwrap()
    }

    #[test]
    fn generate_before_parse_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gen = CodeGenerator::new(GeneratorConfig::new(dir.path()));
        assert!(matches!(gen.generate_all(), Err(CodegenError::Config(_))));
    }

    #[test]
    fn schemas_cover_combinations_and_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let mut gen = CodeGenerator::new(GeneratorConfig::new(dir.path()));
        gen.parse(&registry()).unwrap();
        gen.generate_schemas().unwrap();
        let out = std::fs::read_to_string(dir.path().join("schemas.rs")).unwrap();
        assert!(out.contains("pub struct VideoSchema {"));
        assert!(out.contains("pub r#type: Option<String>,"));
        assert!(out.contains("pub struct VideoWithSentence {"));
        assert!(out.contains("pub sentences: Vec<SentenceSchema>,"));
        assert!(out.contains("pub struct SentenceWithVideo {"));
        assert!(out.contains("pub video: Option<VideoSchema>,"));
        assert!(out.contains("pub __fk__video_id: Option<uuid::Uuid>,"));
        assert!(out.contains("/// Body of `POST /video/create_one`."));
        assert!(out.contains("/// Body of `PUT /sentence/update_one`; absent fields are left unchanged."));
    }

    #[test]
    fn keyword_fields_become_raw_identifiers() {
        for kw in ["true", "false", "yield", "try", "box", "abstract", "macro", "typeof"] {
            assert_eq!(ident(kw), format!("r#{}", kw));
        }
        assert_eq!(ident("title"), "title");
        let dir = tempfile::tempdir().unwrap();
        let mut gen = CodeGenerator::new(GeneratorConfig::new(dir.path()));
        let registry = ModelRegistry::from_decls([EntityDecl::new("Flag")
            .field(FieldSpec::new("id", ValueType::BigInt, StorageType::BigInt).primary_key())
            .field(FieldSpec::new("true", ValueType::Bool, StorageType::Boolean))
            .field(FieldSpec::new("yield", ValueType::Float, StorageType::Double).optional())])
        .unwrap();
        gen.parse(&registry).unwrap();
        gen.generate_schemas().unwrap();
        let out = std::fs::read_to_string(dir.path().join("schemas.rs")).unwrap();
        assert!(out.contains("pub r#true: bool,"));
        assert!(out.contains("pub r#yield: Option<f64>,"));
    }

    #[test]
    fn routers_list_every_route() {
        let dir = tempfile::tempdir().unwrap();
        let mut gen = CodeGenerator::new(GeneratorConfig::new(dir.path()));
        gen.parse(&registry()).unwrap();
        let report = gen.generate_routers().unwrap();
        assert_eq!(report.written.len(), 3);
        let video = std::fs::read_to_string(dir.path().join("routers/video.rs")).unwrap();
        assert!(video.contains("(\"get_all_with_sentence\", \"GET\", \"/get_all_with_sentence\", \"VideoWithSentence\"),"));
        assert!(video.contains("(\"link_to_sentence\", \"POST\", \"/link_to_sentence\", \"VideoSchema\"),"));
        let module = std::fs::read_to_string(dir.path().join("routers/mod.rs")).unwrap();
        assert!(module.contains("pub mod video;"));
        assert!(module.contains("pub mod sentence;"));
    }
}
