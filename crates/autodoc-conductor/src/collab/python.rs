//! Python source structure via tree-sitter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use autodoc_core::{
    CodeSnippet, ImportRef, ParsedClass, ParsedFunction, ParsedModule, SymbolType,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tree_sitter::{Node, Parser};
use walkdir::WalkDir;

/// Directories never descended into.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".env",
    "__pycache__",
    ".git",
    ".github",
    "node_modules",
];

pub fn exclude_set(dirs: &[&str], extra_globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for dir in dirs {
        builder.add(Glob::new(&format!("**/{dir}"))?);
    }
    for glob in extra_globs {
        builder.add(Glob::new(glob).with_context(|| format!("invalid exclude glob: {glob}"))?);
    }
    Ok(builder.build()?)
}

/// All `*.py` files under `root`, sorted, skipping excluded directories.
pub fn find_python_files(root: &Path, excludes: &GlobSet) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let rel = e.path().strip_prefix(root).unwrap_or(e.path());
            !excludes.is_match(rel)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|x| x == "py"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

// ── Parsing ──

fn text<'a>(node: Node<'_>, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Parse one module. `rel_path` is stored as the module's file path.
pub fn parse_module(source: &str, rel_path: &str) -> Result<ParsedModule> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::language())
        .map_err(|e| anyhow!("failed to set language: {e}"))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow!("failed to parse {rel_path}"))?;
    let root = tree.root_node();
    let src = source.as_bytes();

    let mut module = ParsedModule {
        file_path: rel_path.to_string(),
        docstring: block_docstring(root, src),
        imports: Vec::new(),
        functions: Vec::new(),
        classes: Vec::new(),
        code: source.to_string(),
    };

    collect_imports(root, src, &mut module.imports);

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let (outer, def) = unwrap_decorated(child);
        match def.kind() {
            "function_definition" => module.functions.push(parse_function(outer, def, src)),
            "class_definition" => module.classes.push(parse_class(outer, def, src)),
            _ => {}
        }
    }
    Ok(module)
}

/// `decorated_definition` → (decorated node, inner definition).
fn unwrap_decorated(node: Node<'_>) -> (Node<'_>, Node<'_>) {
    if node.kind() == "decorated_definition" {
        if let Some(def) = node.child_by_field_name("definition") {
            return (node, def);
        }
    }
    (node, node)
}

fn parse_function(outer: Node<'_>, def: Node<'_>, src: &[u8]) -> ParsedFunction {
    let name = def
        .child_by_field_name("name")
        .map(|n| text(n, src).to_string())
        .unwrap_or_default();
    let params = def
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, src))
        .unwrap_or_default();
    let is_async = def.child(0).is_some_and(|c| c.kind() == "async");
    ParsedFunction {
        name,
        docstring: def
            .child_by_field_name("body")
            .and_then(|b| block_docstring(b, src)),
        params,
        code: text(outer, src).to_string(),
        start_line: outer.start_position().row + 1,
        end_line: outer.end_position().row + 1,
        is_async,
    }
}

fn parse_class(outer: Node<'_>, def: Node<'_>, src: &[u8]) -> ParsedClass {
    let name = def
        .child_by_field_name("name")
        .map(|n| text(n, src).to_string())
        .unwrap_or_default();

    let mut base_classes = Vec::new();
    if let Some(args) = def.child_by_field_name("superclasses") {
        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            if arg.kind() != "keyword_argument" {
                base_classes.push(text(arg, src).to_string());
            }
        }
    }

    let mut methods = Vec::new();
    let body = def.child_by_field_name("body");
    if let Some(body) = body {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let (m_outer, m_def) = unwrap_decorated(child);
            if m_def.kind() == "function_definition" {
                methods.push(parse_function(m_outer, m_def, src));
            }
        }
    }

    ParsedClass {
        name,
        docstring: body.and_then(|b| block_docstring(b, src)),
        base_classes,
        methods,
        code: text(outer, src).to_string(),
        start_line: outer.start_position().row + 1,
        end_line: outer.end_position().row + 1,
    }
}

fn parameter_names(params: Node<'_>, src: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for p in params.named_children(&mut cursor) {
        let name = match p.kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                Some(text(p, src).to_string())
            }
            "default_parameter" | "typed_default_parameter" => p
                .child_by_field_name("name")
                .map(|n| text(n, src).to_string()),
            "typed_parameter" => p.named_child(0).map(|n| text(n, src).to_string()),
            _ => None,
        };
        if let Some(name) = name {
            out.push(name);
        }
    }
    out
}

fn collect_imports(root: Node<'_>, src: &[u8], out: &mut Vec<ImportRef>) {
    let mut cursor = root.walk();
    for stmt in root.named_children(&mut cursor) {
        match stmt.kind() {
            "import_statement" => {
                let mut c = stmt.walk();
                for item in stmt.named_children(&mut c) {
                    let (module, alias) = aliased(item, src);
                    out.push(ImportRef {
                        module,
                        name: None,
                        alias,
                    });
                }
            }
            "import_from_statement" => {
                let module_node = stmt.child_by_field_name("module_name");
                let module = module_node
                    .map(|n| text(n, src).to_string())
                    .unwrap_or_default();
                let mut c = stmt.walk();
                for item in stmt.named_children(&mut c) {
                    if Some(item.id()) == module_node.map(|n| n.id()) {
                        continue;
                    }
                    match item.kind() {
                        "wildcard_import" => out.push(ImportRef {
                            module: module.clone(),
                            name: Some("*".to_string()),
                            alias: None,
                        }),
                        "dotted_name" | "aliased_import" => {
                            let (name, alias) = aliased(item, src);
                            out.push(ImportRef {
                                module: module.clone(),
                                name: Some(name),
                                alias,
                            });
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn aliased(node: Node<'_>, src: &[u8]) -> (String, Option<String>) {
    if node.kind() == "aliased_import" {
        let name = node
            .child_by_field_name("name")
            .map(|n| text(n, src).to_string())
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|n| text(n, src).to_string());
        (name, alias)
    } else {
        (text(node, src).to_string(), None)
    }
}

/// Docstring: the first statement of a module or block, if it is a bare string.
fn block_docstring(block: Node<'_>, src: &[u8]) -> Option<String> {
    let first = block.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let doc = clean_docstring(&unquote(text(string, src)));
    (!doc.is_empty()).then_some(doc)
}

fn unquote(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for q in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body.strip_prefix(q).and_then(|b| b.strip_suffix(q)) {
            return inner.to_string();
        }
    }
    body.to_string()
}

/// Trim and remove the common indentation of continuation lines.
fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let indent = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = vec![first.trim().to_string()];
    for line in rest {
        out.push(line.get(indent..).unwrap_or("").trim_end().to_string());
    }
    out.join("\n").trim().to_string()
}

// ── Snippets ──

/// Snippets for a parsed module: the module itself (only when it has a
/// docstring), top-level functions, classes and their methods.
pub fn snippets_for_module(module: &ParsedModule) -> Vec<CodeSnippet> {
    let path = module.file_path.as_str();
    let snippet = |kind: SymbolType, symbol: Option<String>, code: &str, start: usize, end: usize, doc: &Option<String>| {
        CodeSnippet {
            id: CodeSnippet::make_id(kind, path, symbol.as_deref()),
            file_path: path.to_string(),
            start_line: start,
            end_line: end,
            text_content: code.to_string(),
            symbol_name: symbol,
            symbol_type: kind,
            language: "python".to_string(),
            original_docstring: doc.clone(),
            enhanced_docstring: None,
            ai_summary_en: None,
            ai_summary_vi: None,
        }
    };

    let mut out = Vec::new();
    if module.docstring.is_some() {
        let mut s = snippet(
            SymbolType::Module,
            None,
            &module.code,
            1,
            module.code.lines().count().max(1),
            &module.docstring,
        );
        s.symbol_name = Some(module.short_name().to_string());
        out.push(s);
    }
    for f in &module.functions {
        out.push(snippet(
            SymbolType::Function,
            Some(f.name.clone()),
            &f.code,
            f.start_line,
            f.end_line,
            &f.docstring,
        ));
    }
    for c in &module.classes {
        out.push(snippet(
            SymbolType::Class,
            Some(c.name.clone()),
            &c.code,
            c.start_line,
            c.end_line,
            &c.docstring,
        ));
        for m in &c.methods {
            out.push(snippet(
                SymbolType::Method,
                Some(format!("{}.{}", c.name, m.name)),
                &m.code,
                m.start_line,
                m.end_line,
                &m.docstring,
            ));
        }
    }
    disambiguate_ids(&mut out);
    out
}

/// Suffix repeated ids with `#2`, `#3`, ... in source order. The first
/// occurrence keeps the plain id.
fn disambiguate_ids(snippets: &mut [CodeSnippet]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for s in snippets.iter_mut() {
        let count = seen.entry(s.id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let mut n = *count;
            let mut candidate = format!("{}#{n}", s.id);
            while seen.contains_key(&candidate) {
                n += 1;
                candidate = format!("{}#{n}", s.id);
            }
            seen.insert(candidate.clone(), 1);
            s.id = candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#""""Widget helpers.

    Utilities for widgets.
"""
import os
import numpy as np
from collections import OrderedDict, defaultdict as dd
from .models import *


def build(name, size: int = 3, *args, **kwargs):
    """Build a widget."""
    return name


@cached
async def fetch(url):
    return url


class Widget(Base, metaclass=Meta):
    '''A widget.'''

    def __init__(self, name):
        self.name = name

    @property
    def label(self):
        """Label text for display."""
        return self.name
"#;

    #[test]
    fn parses_module_structure() {
        let m = parse_module(SAMPLE, "pkg/widgets.py").unwrap();
        assert_eq!(m.docstring.as_deref(), Some("Widget helpers.\n\nUtilities for widgets."));

        assert_eq!(m.functions.len(), 2);
        let build = &m.functions[0];
        assert_eq!(build.name, "build");
        assert_eq!(build.params, vec!["name", "size", "*args", "**kwargs"]);
        assert_eq!(build.docstring.as_deref(), Some("Build a widget."));
        assert!(!build.is_async);

        let fetch = &m.functions[1];
        assert_eq!(fetch.name, "fetch");
        assert!(fetch.is_async);
        assert!(fetch.code.starts_with("@cached"));
        assert!(fetch.docstring.is_none());

        assert_eq!(m.classes.len(), 1);
        let w = &m.classes[0];
        assert_eq!(w.name, "Widget");
        assert_eq!(w.base_classes, vec!["Base"]);
        assert_eq!(w.docstring.as_deref(), Some("A widget."));
        let names: Vec<&str> = w.methods.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["__init__", "label"]);
        assert_eq!(w.methods[0].params, vec!["self", "name"]);
    }

    #[test]
    fn parses_imports() {
        let m = parse_module(SAMPLE, "pkg/widgets.py").unwrap();
        let imports: Vec<(String, Option<String>, Option<String>)> = m
            .imports
            .iter()
            .map(|i| (i.module.clone(), i.name.clone(), i.alias.clone()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("os".into(), None, None),
                ("numpy".into(), None, Some("np".into())),
                ("collections".into(), Some("OrderedDict".into()), None),
                ("collections".into(), Some("defaultdict".into()), Some("dd".into())),
                (".models".into(), Some("*".into()), None),
            ]
        );
    }

    #[test]
    fn snippet_ids_and_kinds() {
        let m = parse_module(SAMPLE, "pkg/widgets.py").unwrap();
        let ids: Vec<String> = snippets_for_module(&m).into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "module:pkg/widgets.py",
                "function:pkg/widgets.py:build",
                "function:pkg/widgets.py:fetch",
                "class:pkg/widgets.py:Widget",
                "method:pkg/widgets.py:Widget.__init__",
                "method:pkg/widgets.py:Widget.label",
            ]
        );
    }

    #[test]
    fn repeated_symbols_get_distinct_ids() {
        let src = "class Temp:\n    @property\n    def value(self):\n        return self._v\n\n    @value.setter\n    def value(self, v):\n        self._v = v\n\n\ndef f():\n    pass\n\n\ndef f():\n    return 1\n";
        let m = parse_module(src, "t.py").unwrap();
        let ids: Vec<String> = snippets_for_module(&m).into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "function:t.py:f",
                "function:t.py:f#2",
                "class:t.py:Temp",
                "method:t.py:Temp.value",
                "method:t.py:Temp.value#2",
            ]
        );
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        // Same source, same ids.
        let again: Vec<String> = snippets_for_module(&m).into_iter().map(|s| s.id).collect();
        assert_eq!(again, ids);
    }

    #[test]
    fn module_without_docstring_has_no_module_snippet() {
        let m = parse_module("def f():\n    pass\n", "a.py").unwrap();
        let snippets = snippets_for_module(&m);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].symbol_type, SymbolType::Function);
        assert_eq!((snippets[0].start_line, snippets[0].end_line), (1, 2));
    }

    #[test]
    fn finds_files_sorted_and_skips_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join("venv/lib")).unwrap();
        fs::create_dir_all(root.join("pkg/__pycache__")).unwrap();
        fs::write(root.join("pkg/b.py"), "").unwrap();
        fs::write(root.join("a.py"), "").unwrap();
        fs::write(root.join("venv/lib/site.py"), "").unwrap();
        fs::write(root.join("pkg/__pycache__/b.py"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let set = exclude_set(DEFAULT_EXCLUDES, &[]).unwrap();
        let files: Vec<String> = find_python_files(root, &set)
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(files, vec!["a.py", "pkg/b.py"]);
    }

    #[test]
    fn extra_globs_exclude_more() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("tests/test_a.py"), "").unwrap();
        fs::write(root.join("main.py"), "").unwrap();

        let set = exclude_set(DEFAULT_EXCLUDES, &["tests".to_string()]).unwrap();
        assert_eq!(find_python_files(root, &set).len(), 1);
    }
}
