use std::path::{Path, PathBuf};

use archsync_core::layout::{FsLayoutStore, Layout, LayoutStore};
use archsync_core::rules::{rule_by_name, rules_overview, strict_rules};
use archsync_core::settings::Settings;
use archsync_core::storage::{default_home, write_atomic, ModelStore};
use archsync_core::{
    compute_diff, validate, Architecture, Format, NodeProperty, NodeType, PatchError, SourceEdit,
    SourcePatcher, SyncChange, SyncOutcome, ValidationError, ValidationRule,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tracing::{info, warn};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ModelRequest {
    /// Name of the model
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetModelRequest {
    /// Name of the model to create or overwrite
    name: String,
    /// The complete architecture as CALM JSON: {"unique-id", "name", "description", "nodes": [...], "relationships": [...], "flows"?: [...], "controls"?: {...}, "metadata"?: {...}}. See get_model output for the exact shape.
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenderRequest {
    /// Name of the model to render
    name: String,
    /// Output format: "json", "d2", "rich-d2" (annotated D2 that import_diagram can read back) or "source" (Rust builder code)
    format: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ImportDiagramRequest {
    /// Name to store the imported model under
    name: String,
    /// Annotated D2 text as produced by render_model with format "rich-d2"
    text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ValidateRequest {
    /// Name of the model to validate
    name: String,
    /// Rule names to run instead of the configured set (see get_rules)
    rules: Option<Vec<String>>,
    /// Run every rule, including the opt-in NoUnusedNodes and UniqueIdentifiers
    strict: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SyncSourceRequest {
    /// Name of the model whose nodes the source should declare
    name: String,
    /// Path of the Rust source file that builds the model
    path: String,
    /// Return the patched source instead of writing it
    preview: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DiagramToSourceRequest {
    /// Path of the Rust source file that builds the model
    path: String,
    /// Annotated D2 text, typically an edited render_model "rich-d2" output
    text: String,
    /// Return the patched source instead of writing it
    preview: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EditSourceRequest {
    /// Path of the Rust source file that builds the model
    path: String,
    /// Return the patched source instead of writing it
    preview: Option<bool>,
    /// "add", "update" or "delete"
    op: String,
    /// Node id the edit targets
    id: String,
    /// Node type for "add": actor, service, database, system, queue, webclient
    node_type: Option<String>,
    /// Display name for "add"
    name: Option<String>,
    /// Description for "add"
    description: Option<String>,
    /// Property for "update"
    property: Option<NodeProperty>,
    /// New value for "update"
    value: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetLayoutRequest {
    /// Architecture unique-id the layout belongs to
    architecture_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetLayoutRequest {
    /// Architecture unique-id the layout belongs to
    architecture_id: String,
    /// Node positions keyed by node id
    layout: Layout,
}

// --- Server ---

#[derive(Clone)]
pub struct ArchsyncServer {
    home: PathBuf,
    store: ModelStore,
    tool_router: ToolRouter<Self>,
}

fn ok(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

fn fail(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(text.into())]))
}

fn report(path: &Path, changes: &[SyncChange]) -> String {
    let mut lines = vec![format!("Updated {}.", path.display())];
    lines.extend(changes.iter().map(|c| format!("  {}", c)));
    lines.join("\n")
}

/// Wrap a single edit so it reports like a sync.
fn single(
    edit: &SourceEdit,
) -> impl FnOnce(&SourcePatcher, &str) -> Result<SyncOutcome, PatchError> + '_ {
    move |patcher: &SourcePatcher, source: &str| {
        patcher.apply(source, edit).map(|source| SyncOutcome {
            source,
            changes: Vec::new(),
        })
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return "Valid: no rule violations.".to_string();
    }
    let mut lines = vec![format!("{} violation(s):", errors.len())];
    lines.extend(errors.iter().map(|e| format!("  - {}", e)));
    lines.join("\n")
}

#[tool_router]
impl ArchsyncServer {
    pub fn new(home: PathBuf) -> Self {
        Self {
            store: ModelStore::new(home.clone()),
            home,
            tool_router: Self::tool_router(),
        }
    }

    fn settings(&self) -> Settings {
        Settings::read(&self.home)
    }

    fn read(&self, name: &str) -> Result<Architecture, String> {
        self.store
            .read(name)
            .map_err(|e| format!("Failed to read model '{}': {}", name, e))
    }

    /// Store a model and report how it fares against the configured rules.
    fn store_and_report(&self, name: &str, model: &Architecture) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.store.write(name, model) {
            return fail(format!("Failed to write model '{}': {}", name, e));
        }
        let settings = self.settings();
        let errors = validate(model, &settings.validation_rules());
        info!(name, nodes = model.nodes.len(), violations = errors.len(), "model stored");
        ok(format!(
            "Saved '{}' ({} nodes, {} relationships). {}",
            name,
            model.nodes.len(),
            model.relationships.len(),
            summarize(&errors)
        ))
    }

    /// Patch a source file in place. The file is only rewritten when the edit
    /// succeeds and changes something; a preview returns the text instead.
    fn patch_file(
        &self,
        path: &str,
        preview: bool,
        patch: impl FnOnce(&SourcePatcher, &str) -> Result<SyncOutcome, PatchError>,
    ) -> Result<CallToolResult, McpError> {
        let path = Path::new(path);
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => return fail(format!("Failed to read {}: {}", path.display(), e)),
        };
        let patcher = SourcePatcher::new(self.settings().declaration);
        let outcome = match patch(&patcher, &source) {
            Ok(o) => o,
            Err(e) => return fail(format!("{} left unchanged: {}", path.display(), e)),
        };
        if preview {
            return ok(outcome.source);
        }
        if outcome.source == source {
            return ok(format!("{} is already up to date.", path.display()));
        }
        if let Err(e) = write_atomic(path, &outcome.source) {
            return fail(format!("Failed to write {}: {}", path.display(), e));
        }
        info!(path = %path.display(), changes = outcome.changes.len(), "source patched");
        ok(report(path, &outcome.changes))
    }

    #[tool(description = "List all available architecture models")]
    fn list_models(&self) -> Result<CallToolResult, McpError> {
        match self.store.list() {
            Ok(names) if names.is_empty() => ok("No models found. Use set_model to create one."),
            Ok(names) => ok(names.join("\n")),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Get the full CALM JSON of a model. Also records what you saw, so get_changes can later report edits made elsewhere."
    )]
    fn get_model(
        &self,
        Parameters(req): Parameters<ModelRequest>,
    ) -> Result<CallToolResult, McpError> {
        let model = match self.read(&req.name) {
            Ok(m) => m,
            Err(e) => return fail(e),
        };
        if let Err(e) = self.store.save_baseline(&req.name, &model) {
            warn!(name = %req.name, error = %e, "could not record baseline");
        }
        match model.to_json() {
            Ok(json) => ok(json),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Create or overwrite a model from complete CALM JSON. The model is stored even if it violates validation rules; violations are listed in the response."
    )]
    fn set_model(
        &self,
        Parameters(req): Parameters<SetModelRequest>,
    ) -> Result<CallToolResult, McpError> {
        match Architecture::from_json(&req.data) {
            Ok(model) => self.store_and_report(&req.name, &model),
            Err(e) => fail(format!("Invalid model JSON: {}", e)),
        }
    }

    #[tool(
        description = "Render a model as text: \"json\" (CALM JSON), \"d2\" (plain diagram), \"rich-d2\" (diagram with @calm annotations, lossless) or \"source\" (Rust builder code)"
    )]
    fn render_model(
        &self,
        Parameters(req): Parameters<RenderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let format: Format = match req.format.parse() {
            Ok(f) => f,
            Err(e) => return fail(format!("{}", e)),
        };
        let model = match self.read(&req.name) {
            Ok(m) => m,
            Err(e) => return fail(e),
        };
        let direction = self.settings().diagram_direction;
        match format.renderer_with_direction(&direction).render(&model) {
            Ok(text) => ok(text),
            Err(e) => fail(e.to_string()),
        }
    }

    #[tool(
        description = "Import annotated D2 text (render_model format \"rich-d2\", possibly hand-edited) and store the recovered model. Malformed annotation values are skipped rather than rejected."
    )]
    fn import_diagram(
        &self,
        Parameters(req): Parameters<ImportDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        let model = archsync_core::parse(&req.text);
        if model.id.is_empty() && model.nodes.is_empty() {
            return fail("No @calm annotations found; nothing to import.");
        }
        self.store_and_report(&req.name, &model)
    }

    #[tool(description = "Validate a model against the governance rules and list every violation")]
    fn validate_model(
        &self,
        Parameters(req): Parameters<ValidateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let model = match self.read(&req.name) {
            Ok(m) => m,
            Err(e) => return fail(e),
        };
        let rules: Vec<&dyn ValidationRule> = if req.strict.unwrap_or(false) {
            strict_rules()
        } else if let Some(names) = &req.rules {
            let mut picked = Vec::new();
            for name in names {
                match rule_by_name(name) {
                    Some(rule) => picked.push(rule),
                    None => return fail(format!("Unknown rule '{}'. Use get_rules to list them.", name)),
                }
            }
            picked
        } else {
            self.settings().validation_rules()
        };
        let errors = validate(&model, &rules);
        ok(summarize(&errors))
    }

    #[tool(
        description = "Summarize what changed in a model since you last read it with get_model or get_changes"
    )]
    fn get_changes(
        &self,
        Parameters(req): Parameters<ModelRequest>,
    ) -> Result<CallToolResult, McpError> {
        let current = match self.read(&req.name) {
            Ok(m) => m,
            Err(e) => return fail(e),
        };
        let Some(baseline) = self.store.read_baseline(&req.name) else {
            if let Err(e) = self.store.save_baseline(&req.name, &current) {
                warn!(name = %req.name, error = %e, "could not record baseline");
            }
            return ok("No baseline yet. Recorded the current state; call get_changes again later.");
        };
        let diff = compute_diff(&baseline, &current);
        if let Err(e) = self.store.save_baseline(&req.name, &current) {
            warn!(name = %req.name, error = %e, "could not record baseline");
        }
        ok(diff)
    }

    #[tool(description = "List the validation rules, marking which are active by default")]
    fn get_rules(&self) -> Result<CallToolResult, McpError> {
        let active: Vec<&str> = self
            .settings()
            .validation_rules()
            .iter()
            .map(|r| r.name())
            .collect();
        ok(format!(
            "{}\n\nActive: {}",
            rules_overview(),
            active.join(", ")
        ))
    }

    #[tool(
        description = "Bring program source in line with a stored model: updates names and descriptions of declared nodes, adds missing node declarations and removes declarations the model no longer has. Everything else in the file is preserved byte for byte."
    )]
    fn sync_source(
        &self,
        Parameters(req): Parameters<SyncSourceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let model = match self.read(&req.name) {
            Ok(m) => m,
            Err(e) => return fail(e),
        };
        self.patch_file(&req.path, req.preview.unwrap_or(false), |patcher, source| {
            patcher.sync_report(source, &model)
        })
    }

    #[tool(
        description = "Apply an edited annotated diagram (render_model \"rich-d2\") to program source: the diagram's nodes are synced into the file like sync_source does for a stored model. Lists every node added, renamed, redescribed or removed."
    )]
    fn diagram_to_source(
        &self,
        Parameters(req): Parameters<DiagramToSourceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let model = archsync_core::parse(&req.text);
        if model.nodes.is_empty() {
            return fail("No annotated nodes found in the diagram; refusing to empty the source.");
        }
        self.patch_file(&req.path, req.preview.unwrap_or(false), |patcher, source| {
            patcher.sync_report(source, &model)
        })
    }

    #[tool(
        description = "Apply a single node edit to program source in place: add a declaration, update a node's name/description/owner, or delete a declaration. The file is left untouched if the edit fails."
    )]
    fn edit_source(
        &self,
        Parameters(req): Parameters<EditSourceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let edit = match req.op.as_str() {
            "add" => {
                let node_type: NodeType = match req.node_type.as_deref().unwrap_or("service").parse() {
                    Ok(t) => t,
                    Err(e) => return fail(format!("{}", e)),
                };
                SourceEdit::Add {
                    id: req.id,
                    node_type,
                    name: req.name.unwrap_or_default(),
                    description: req.description.unwrap_or_default(),
                }
            }
            "update" => {
                let (Some(property), Some(value)) = (req.property, req.value) else {
                    return fail("update needs both 'property' and 'value'");
                };
                SourceEdit::Update {
                    id: req.id,
                    property,
                    value,
                }
            }
            "delete" => SourceEdit::Delete { id: req.id },
            other => return fail(format!("Unknown op '{}': expected add, update or delete", other)),
        };
        self.patch_file(&req.path, req.preview.unwrap_or(false), single(&edit))
    }

    #[tool(description = "Get saved diagram node positions for an architecture")]
    fn get_layout(
        &self,
        Parameters(req): Parameters<GetLayoutRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = FsLayoutStore::new(&self.home);
        match store
            .load(&req.architecture_id)
            .map_err(|e| e.to_string())
            .and_then(|layout| serde_json::to_string_pretty(&layout).map_err(|e| e.to_string()))
        {
            Ok(json) => ok(json),
            Err(e) => fail(e),
        }
    }

    #[tool(description = "Save diagram node positions for an architecture, replacing any saved layout")]
    fn set_layout(
        &self,
        Parameters(req): Parameters<SetLayoutRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = FsLayoutStore::new(&self.home);
        match store.save(&req.architecture_id, &req.layout) {
            Ok(()) => ok(format!(
                "Saved layout for '{}' ({} nodes).",
                req.architecture_id,
                req.layout.nodes.len()
            )),
            Err(e) => fail(e.to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for ArchsyncServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## Validation rules\n{}", INSTRUCTIONS, rules_overview());
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

const INSTRUCTIONS: &str = r#"archsync keeps one CALM architecture in sync across three forms: CALM JSON, D2 diagrams and Rust builder code.

- Read a model with get_model; write one with set_model.
- render_model "rich-d2" gives diagram text that import_diagram reads back without loss. Edit the `# @calm:` lines, not the labels.
- To change the Rust code that builds a model, prefer sync_source, edit_source or diagram_to_source over regenerating it with render_model "source": they patch declarations in place and keep everything else. Pass preview=true to see the result without writing.
- get_changes reports edits made by someone else since you last looked."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let home = default_home();
    info!(home = %home.display(), "starting archsync-mcp");

    let service = ArchsyncServer::new(home)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archsync_core::{render, Format};
    use tempfile::TempDir;

    fn model() -> Architecture {
        let mut arch = Architecture::new("shop", "Shop", "");
        arch.define_node("user", NodeType::Actor, "User", "")
            .with_owner("cx");
        arch.define_node("api", NodeType::Service, "API", "Public API")
            .with_owner("platform");
        arch.interacts("user-api", "", "user", &["api"]);
        arch
    }

    fn renamed() -> Architecture {
        let mut arch = model();
        arch.nodes[1].name = "Gateway".to_string();
        arch
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    fn setup() -> (TempDir, ArchsyncServer, PathBuf, String) {
        let tmp = TempDir::new().unwrap();
        let server = ArchsyncServer::new(tmp.path().join("home"));
        let path = tmp.path().join("arch.rs");
        let source = render(&model(), Format::Source).unwrap();
        std::fs::write(&path, &source).unwrap();
        (tmp, server, path, source)
    }

    #[test]
    fn preview_returns_patch_without_writing() {
        let (_tmp, server, path, source) = setup();
        server.store.write("shop", &renamed()).unwrap();

        let result = server
            .sync_source(Parameters(SyncSourceRequest {
                name: "shop".to_string(),
                path: path.display().to_string(),
                preview: Some(true),
            }))
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        let expected = SourcePatcher::default().sync(&source, &renamed()).unwrap();
        assert_eq!(text(&result), expected);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn diagram_edits_reach_the_source_file() {
        let (_tmp, server, path, source) = setup();
        let diagram = render(&renamed(), Format::AnnotatedDiagram).unwrap();

        let result = server
            .diagram_to_source(Parameters(DiagramToSourceRequest {
                path: path.display().to_string(),
                text: diagram,
                preview: None,
            }))
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert!(text(&result).contains("~ api name: \"API\" -> \"Gateway\""));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, source.replacen("\"API\"", "\"Gateway\"", 1));
    }

    #[test]
    fn diagram_without_nodes_leaves_source_alone() {
        let (_tmp, server, path, source) = setup();
        let plain = render(&renamed(), Format::Diagram).unwrap();

        let result = server
            .diagram_to_source(Parameters(DiagramToSourceRequest {
                path: path.display().to_string(),
                text: plain,
                preview: None,
            }))
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), source);
    }

    #[test]
    fn failed_edit_preview_is_an_error() {
        let (_tmp, server, path, source) = setup();
        let result = server
            .edit_source(Parameters(EditSourceRequest {
                path: path.display().to_string(),
                preview: Some(true),
                op: "delete".to_string(),
                id: "ghost".to_string(),
                node_type: None,
                name: None,
                description: None,
                property: None,
                value: None,
            }))
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), source);
    }
}
