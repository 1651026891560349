//! Docusaurus project layout and page rendering.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use autodoc_core::{CodeSnippet, KnowledgeResults, LocalizedText, RepositoryInfo, SymbolType};

pub const VI_DOCS_DIR: &str = "i18n/vi/docusaurus-plugin-content-docs/current";

/// Everything a site render needs, borrowed from the workflow state.
pub struct SiteContent<'a> {
    pub repo: &'a RepositoryInfo,
    pub snippets: &'a [CodeSnippet],
    pub summaries: Option<&'a BTreeMap<String, LocalizedText>>,
    pub knowledge: Option<&'a KnowledgeResults>,
    pub diagrams: Option<&'a BTreeMap<String, String>>,
    /// Translated summaries / knowledge, preferred for `vi` pages.
    pub vi_summaries: Option<&'a BTreeMap<String, LocalizedText>>,
    pub vi_knowledge: Option<&'a KnowledgeResults>,
    pub with_vi: bool,
}

impl SiteContent<'_> {
    fn has_diagrams(&self) -> bool {
        self.diagrams.is_some_and(|d| !d.is_empty())
    }

    fn knowledge_for(&self, lang: &str) -> Option<&KnowledgeResults> {
        if lang == "vi" {
            self.vi_knowledge.or(self.knowledge)
        } else {
            self.knowledge
        }
    }

    fn summary(&self, snippet: &CodeSnippet, lang: &str) -> Option<String> {
        let pick = |map: Option<&BTreeMap<String, LocalizedText>>| {
            map.and_then(|m| m.get(&snippet.id)).and_then(|t| t.get(lang)).cloned()
        };
        match lang {
            "vi" => pick(self.vi_summaries)
                .or_else(|| pick(self.summaries))
                .or_else(|| snippet.ai_summary_vi.clone())
                .or_else(|| self.summary(snippet, "en")),
            _ => pick(self.summaries).or_else(|| snippet.ai_summary_en.clone()),
        }
    }

    /// Snippets grouped by file, files sorted.
    pub fn files(&self) -> BTreeMap<&str, Vec<&CodeSnippet>> {
        let mut files: BTreeMap<&str, Vec<&CodeSnippet>> = BTreeMap::new();
        for snippet in self.snippets {
            files.entry(snippet.file_path.as_str()).or_default().push(snippet);
        }
        files
    }
}

fn localized<'t>(text: &'t LocalizedText, lang: &str) -> Option<&'t String> {
    text.get(lang).or_else(|| text.get("en"))
}

/// Doc slug for a source file: `pkg/core.py` -> `pkg-core`.
pub fn slug(path: &str) -> String {
    let stem = path.strip_suffix(".py").unwrap_or(path);
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Neutralize characters MDX would treat as JSX in prose.
pub fn escape_mdx(text: &str) -> String {
    text.replace('<', "&lt;")
        .replace('{', "&#123;")
        .replace('}', "&#125;")
}

fn js_str(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn mermaid(source: &str) -> String {
    format!("```mermaid\n{}\n```\n", source.trim_end())
}

// ── Project files ──

pub fn config_js(project: &str, with_vi: bool) -> String {
    let project = js_str(project);
    let locales = if with_vi { "['en', 'vi']" } else { "['en']" };
    format!(
        r#"// @ts-check

const lightCodeTheme = require('prism-react-renderer/themes/github');
const darkCodeTheme = require('prism-react-renderer/themes/dracula');

/** @type {{import('@docusaurus/types').Config}} */
const config = {{
  title: '{project} Documentation',
  tagline: 'Generated by AutoDoc AI',
  url: 'https://example.com',
  baseUrl: '/',
  projectName: '{project}',
  onBrokenLinks: 'warn',
  onBrokenMarkdownLinks: 'warn',

  i18n: {{
    defaultLocale: 'en',
    locales: {locales},
  }},

  presets: [
    [
      'classic',
      ({{
        docs: {{
          sidebarPath: require.resolve('./sidebars.js'),
        }},
        theme: {{
          customCss: require.resolve('./src/css/custom.css'),
        }},
      }}),
    ],
  ],

  themes: ['@docusaurus/theme-mermaid'],
  markdown: {{
    mermaid: true,
  }},

  themeConfig: ({{
    navbar: {{
      title: '{project}',
      items: [
        {{ type: 'docSidebar', sidebarId: 'docsSidebar', position: 'left', label: 'Documentation' }},
        {{ type: 'localeDropdown', position: 'right' }},
      ],
    }},
    footer: {{
      style: 'dark',
      copyright: `Documentation generated by AutoDoc AI.`,
    }},
    prism: {{
      theme: lightCodeTheme,
      darkTheme: darkCodeTheme,
      additionalLanguages: ['python'],
    }},
  }}),
}};

module.exports = config;
"#
    )
}

pub fn sidebars_js(has_architecture: bool, module_ids: &[String]) -> String {
    let mut items = vec!["'intro'".to_string()];
    if has_architecture {
        items.push("'architecture'".to_string());
    }
    let modules: Vec<String> = module_ids.iter().map(|id| format!("'{}'", js_str(id))).collect();
    format!(
        "/** @type {{import('@docusaurus/plugin-content-docs').SidebarsConfig}} */\n\
         const sidebars = {{\n  docsSidebar: [\n    {items},\n    {{\n      type: 'category',\n      \
         label: 'Modules',\n      items: [{modules}],\n    }},\n  ],\n}};\n\nmodule.exports = sidebars;\n",
        items = items.join(",\n    "),
        modules = modules.join(", "),
    )
}

pub const CUSTOM_CSS: &str = ":root {
  --ifm-color-primary: #2e8555;
  --ifm-color-primary-dark: #29784c;
  --ifm-color-primary-light: #33925d;
  --ifm-code-font-size: 95%;
}

[data-theme='dark'] {
  --ifm-color-primary: #25c2a0;
  --ifm-color-primary-dark: #21af90;
  --ifm-color-primary-light: #29d5b0;
}
";

// ── Pages ──

pub fn intro_md(content: &SiteContent<'_>, lang: &str) -> String {
    let repo = content.repo;
    let (title, overview_heading, modules_heading, languages_label) = match lang {
        "vi" => ("Giới thiệu", "Tổng quan kiến trúc", "Các module", "Ngôn ngữ"),
        _ => ("Introduction", "Architectural overview", "Modules", "Languages"),
    };
    let mut page = format!(
        "---\nid: intro\ntitle: {title}\nsidebar_position: 1\n---\n\n# {}\n\n",
        escape_mdx(&repo.name)
    );
    if let Some(desc) = &repo.description {
        page.push_str(&format!("{}\n\n", escape_mdx(desc)));
    }
    if !repo.languages.is_empty() {
        page.push_str(&format!("**{languages_label}:** {}\n\n", repo.languages.join(", ")));
    }
    if let Some(overview) = content
        .knowledge_for(lang)
        .and_then(|k| localized(&k.architectural_overview, lang))
    {
        page.push_str(&format!("## {overview_heading}\n\n{}\n\n", escape_mdx(overview)));
    }
    let files = content.files();
    if !files.is_empty() {
        page.push_str(&format!("## {modules_heading}\n\n"));
        for path in files.keys() {
            page.push_str(&format!("- [{path}](modules/{})\n", slug(path)));
        }
    }
    page
}

pub fn architecture_md(content: &SiteContent<'_>, lang: &str) -> String {
    let title = if lang == "vi" { "Kiến trúc" } else { "Architecture" };
    let mut page = format!("---\nid: architecture\ntitle: {title}\nsidebar_position: 2\n---\n\n# {title}\n\n");
    let Some(diagrams) = content.diagrams else {
        return page;
    };
    if let Some(d) = diagrams.get("architecture") {
        page.push_str(&mermaid(d));
        page.push('\n');
    }
    if let Some(d) = diagrams.get("module_dependencies") {
        let heading = if lang == "vi" { "Phụ thuộc giữa các module" } else { "Module dependencies" };
        page.push_str(&format!("## {heading}\n\n{}\n", mermaid(d)));
    }
    for (key, d) in diagrams.iter().filter(|(k, _)| k.starts_with("flow_")) {
        let name = key.trim_start_matches("flow_");
        page.push_str(&format!("## `{name}`\n\n{}\n", mermaid(d)));
    }
    page
}

pub fn module_md(content: &SiteContent<'_>, path: &str, snippets: &[&CodeSnippet], lang: &str) -> String {
    let mut page = format!("---\nid: {}\ntitle: {path}\n---\n\n# `{path}`\n\n", slug(path));

    if let Some(text) = content
        .knowledge_for(lang)
        .and_then(|k| k.module_explanations.get(path))
        .and_then(|t| localized(t, lang))
    {
        page.push_str(&format!("{}\n\n", escape_mdx(text)));
    }

    let short = path
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .trim_end_matches(".py");
    let class_key = format!("class_{}", super::diagram::sanitize_id(short));
    if let Some(d) = content.diagrams.and_then(|d| d.get(&class_key)) {
        page.push_str(&mermaid(d));
        page.push('\n');
    }

    for snippet in snippets.iter().filter(|s| s.symbol_type != SymbolType::Module) {
        page.push_str(&format!(
            "## {} `{}`\n\n",
            snippet.symbol_type,
            snippet.display_name()
        ));
        if let Some(summary) = content.summary(snippet, lang) {
            page.push_str(&format!("{}\n\n", escape_mdx(&summary)));
        }
        let doc = snippet
            .enhanced_docstring
            .as_ref()
            .and_then(|d| localized(d, lang).cloned())
            .or_else(|| snippet.original_docstring.clone());
        if let Some(doc) = doc {
            page.push_str(&format!("```text\n{}\n```\n\n", doc.trim()));
        }
        page.push_str(&format!(
            "<details>\n<summary>Source (lines {}-{})</summary>\n\n```{}\n{}\n```\n\n</details>\n\n",
            snippet.start_line,
            snippet.end_line,
            snippet.language,
            snippet.text_content.trim_end()
        ));
    }
    page
}

/// Write the full project under `root`, replacing any existing `docs/`.
/// Returns the files written.
pub fn write_site(root: &Path, content: &SiteContent<'_>) -> std::io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut put = |rel: &str, body: &str| -> std::io::Result<()> {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        written.push(path);
        Ok(())
    };

    let docs = root.join("docs");
    if docs.exists() {
        fs::remove_dir_all(&docs)?;
    }
    let vi_root = root.join(VI_DOCS_DIR);
    if vi_root.exists() {
        fs::remove_dir_all(&vi_root)?;
    }

    let files = content.files();
    let module_ids: Vec<String> = files.keys().map(|p| format!("modules/{}", slug(p))).collect();
    let has_arch = content.has_diagrams();

    put("docusaurus.config.js", &config_js(&content.repo.name, content.with_vi))?;
    put("sidebars.js", &sidebars_js(has_arch, &module_ids))?;
    put("src/css/custom.css", CUSTOM_CSS)?;

    let mut locales = vec![("en", "docs".to_string())];
    if content.with_vi {
        locales.push(("vi", VI_DOCS_DIR.to_string()));
    }
    for (lang, dir) in &locales {
        put(&format!("{dir}/intro.md"), &intro_md(content, lang))?;
        if has_arch {
            put(&format!("{dir}/architecture.md"), &architecture_md(content, lang))?;
        }
        for (path, snippets) in &files {
            put(
                &format!("{dir}/modules/{}.md", slug(path)),
                &module_md(content, path, snippets, lang),
            )?;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::fixtures;

    #[test]
    fn slugs() {
        assert_eq!(slug("pkg/core.py"), "pkg-core");
        assert_eq!(slug("My Module/x.y.py"), "my-module-x-y");
        assert_eq!(slug("__init__.py"), "__init__");
    }

    #[test]
    fn mdx_escaping() {
        assert_eq!(escape_mdx("a <b> {c}"), "a &lt;b> &#123;c&#125;");
    }

    #[test]
    fn sidebar_lists_modules() {
        let js = sidebars_js(true, &["modules/pkg-core".to_string()]);
        assert!(js.contains("'intro',\n    'architecture'"));
        assert!(js.contains("items: ['modules/pkg-core']"));
        assert!(!sidebars_js(false, &[]).contains("architecture"));
    }

    #[test]
    fn config_locales_follow_languages() {
        assert!(config_js("w", true).contains("locales: ['en', 'vi']"));
        assert!(config_js("w", false).contains("locales: ['en'],"));
        assert!(config_js("it's", false).contains("title: 'it\\'s Documentation'"));
    }

    #[test]
    fn vi_summary_falls_back_to_english() {
        let dir = tempfile::tempdir().unwrap();
        let repo = fixtures::repo(dir.path());
        let snippet = fixtures::snippet(SymbolType::Function, "a.py", Some("f"), None);
        let summaries = BTreeMap::from([(
            snippet.id.clone(),
            LocalizedText::from([("en".to_string(), "English.".to_string())]),
        )]);
        let snippets = vec![snippet];
        let content = SiteContent {
            repo: &repo,
            snippets: &snippets,
            summaries: Some(&summaries),
            knowledge: None,
            diagrams: None,
            vi_summaries: None,
            vi_knowledge: None,
            with_vi: true,
        };
        assert_eq!(content.summary(&snippets[0], "vi").as_deref(), Some("English."));
    }

    #[test]
    fn writes_project_and_replaces_docs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/stale.md"), "old").unwrap();

        let state = fixtures::analyzed(root);
        let diagrams = BTreeMap::from([("class_core".to_string(), "classDiagram\n".to_string())]);
        let repo = state.repository_metadata.clone().unwrap();
        let content = SiteContent {
            repo: &repo,
            snippets: state.snippets(),
            summaries: None,
            knowledge: None,
            diagrams: Some(&diagrams),
            vi_summaries: None,
            vi_knowledge: None,
            with_vi: true,
        };
        let written = write_site(root, &content).unwrap();

        assert!(!root.join("docs/stale.md").exists());
        assert!(root.join("docs/intro.md").exists());
        assert!(root.join("docs/architecture.md").exists());
        assert!(root.join(VI_DOCS_DIR).join("modules/pkg-core.md").exists());
        assert_eq!(written.len(), 3 + 2 * 3);

        let page = fs::read_to_string(root.join("docs/modules/pkg-core.md")).unwrap();
        assert!(page.contains("```mermaid\nclassDiagram\n```"));
        assert!(page.contains("## function `run`"));
        assert!(!page.contains("## module"));
    }
}
