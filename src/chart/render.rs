//! Turning a chart into manifest documents

use crate::chart::values::merge_values;
use crate::chart::Chart;
use crate::error::{ChartError, ChartResult};
use serde_yaml_ng::Value;

/// Release a chart is rendered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseContext {
    pub name: String,
    pub namespace: String,
}

/// Produces manifest documents from a chart
pub trait Renderer: Send + Sync {
    /// Render `chart` for `release` with fully merged `values`
    fn render(&self, chart: &Chart, release: &ReleaseContext, values: &Value)
        -> ChartResult<Vec<String>>;
}

/// Emits every manifest template as-is
///
/// Files under `templates/` with a `.yaml`, `.yml` or `.json` extension are
/// emitted in path order, each prefixed with a `# Source:` line. Partials
/// (names starting with `_`) and other files are skipped. No template
/// expressions are evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceRenderer;

impl Renderer for SourceRenderer {
    fn render(
        &self,
        chart: &Chart,
        _release: &ReleaseContext,
        _values: &Value,
    ) -> ChartResult<Vec<String>> {
        let mut documents = Vec::new();

        for template in &chart.templates {
            let file_name = template.path.rsplit('/').next().unwrap_or(&template.path);
            let is_manifest = [".yaml", ".yml", ".json"]
                .iter()
                .any(|ext| file_name.ends_with(ext));
            if file_name.starts_with('_') || !is_manifest {
                continue;
            }

            let body = std::str::from_utf8(&template.content).map_err(|_| {
                ChartError::ChartLoad(format!("{} is not valid UTF-8", template.path))
            })?;
            if body.trim().is_empty() {
                continue;
            }

            documents.push(format!(
                "# Source: {}/{}\n{}",
                chart.name(),
                template.path,
                body.trim_end()
            ));
        }

        Ok(documents)
    }
}

/// Merge `overrides` onto the chart defaults and render
pub fn render_chart(
    renderer: &dyn Renderer,
    chart: &Chart,
    release: &ReleaseContext,
    overrides: &Value,
) -> ChartResult<Vec<String>> {
    let values = merge_values(&chart.values, overrides);
    renderer.render(chart, release, &values)
}

/// Join rendered documents into one multi-document YAML stream
pub fn join_documents(documents: &[String]) -> String {
    documents.join("\n---\n")
}
