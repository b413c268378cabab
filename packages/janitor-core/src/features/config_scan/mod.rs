//! Config-reference scanner.
//!
//! Infrastructure files reference symbols by string: serverless handlers,
//! SAM templates, compose commands, Django settings, Airflow DAG callables,
//! packaging manifests and CI workflows. Each extracted string yields the
//! final dotted segment and the full dotted form as candidate symbol names;
//! the reference tracker merges them as synthetic `StringRef` references and
//! the shield pipeline consults the candidate set directly.

use std::path::{Path, PathBuf};

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

/// One config-file occurrence of a candidate symbol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCandidate {
    pub file: PathBuf,
    pub reason: String,
}

/// Candidate symbol names extracted from every scanned config file.
#[derive(Debug, Default)]
pub struct ConfigReferences {
    by_name: FxHashMap<String, Vec<ConfigCandidate>>,
}

impl ConfigReferences {
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn candidates_for(&self, name: &str) -> Option<&[ConfigCandidate]> {
        self.by_name.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = (&String, &Vec<ConfigCandidate>)> {
        self.by_name.iter()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Register a dotted string: both the final segment and the full dotted
    /// form become candidates.
    fn add_dotted(&mut self, dotted: &str, file: &Path, reason: &str) {
        let dotted = dotted.trim();
        if dotted.is_empty() {
            return;
        }
        if let Some(last) = dotted.rsplit('.').next() {
            if !last.is_empty() {
                self.add_exact(last, file, reason);
            }
        }
        if dotted.contains('.') {
            self.add_exact(dotted, file, reason);
        }
    }

    fn add_exact(&mut self, name: &str, file: &Path, reason: &str) {
        let entry = self.by_name.entry(name.to_string()).or_default();
        let candidate = ConfigCandidate {
            file: file.to_path_buf(),
            reason: reason.to_string(),
        };
        if !entry.contains(&candidate) {
            entry.push(candidate);
        }
    }
}

/// Scans the fixed infrastructure-file set at the project root and one
/// level deep.
pub struct ConfigReferenceScanner {
    project_root: PathBuf,
}

impl ConfigReferenceScanner {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn scan(&self) -> ConfigReferences {
        let mut refs = ConfigReferences::default();

        for dir in self.scan_dirs() {
            self.scan_serverless(&dir, &mut refs);
            self.scan_sam_template(&dir, &mut refs);
            self.scan_docker_compose(&dir, &mut refs);
            self.scan_django_settings(&dir, &mut refs);
            self.scan_package_json(&dir, &mut refs);
            self.scan_tsconfig(&dir, &mut refs);
            self.scan_pyproject(&dir, &mut refs);
        }
        self.scan_airflow_dags(&mut refs);
        self.scan_workflows(&mut refs);

        tracing::debug!(candidates = refs.len(), "config scan complete");
        refs
    }

    /// Project root plus its immediate subdirectories.
    fn scan_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.project_root.clone()];
        if let Ok(entries) = std::fs::read_dir(&self.project_root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && !crate::shared::utils::paths::is_excluded(&path) {
                    dirs.push(path);
                }
            }
        }
        dirs
    }

    fn scan_serverless(&self, dir: &Path, refs: &mut ConfigReferences) {
        let path = dir.join("serverless.yml");
        let Some(content) = read(&path) else { return };
        match serde_yaml::from_str::<YamlValue>(&content) {
            Ok(doc) => collect_yaml_key(&doc, "handler", &path, "Lambda handler", refs),
            Err(_) => {
                // Fall back to a line scan when the YAML does not parse.
                regex_dotted(&content, r"handler:\s*([A-Za-z0-9_\.]+)", &path, "Lambda handler", refs);
            }
        }
    }

    fn scan_sam_template(&self, dir: &Path, refs: &mut ConfigReferences) {
        for name in ["template.yaml", "template.yml"] {
            let path = dir.join(name);
            let Some(content) = read(&path) else { continue };
            match serde_yaml::from_str::<YamlValue>(&content) {
                Ok(doc) => collect_yaml_key(&doc, "Handler", &path, "SAM handler", refs),
                Err(_) => {
                    regex_dotted(&content, r"Handler:\s*([A-Za-z0-9_\.]+)", &path, "SAM handler", refs)
                }
            }
        }
    }

    fn scan_docker_compose(&self, dir: &Path, refs: &mut ConfigReferences) {
        for name in ["docker-compose.yml", "docker-compose.yaml"] {
            let path = dir.join(name);
            let Some(content) = read(&path) else { continue };
            let Ok(doc) = serde_yaml::from_str::<YamlValue>(&content) else {
                continue;
            };
            for key in ["command", "entrypoint"] {
                let mut values = Vec::new();
                yaml_values_for_key(&doc, key, &mut values);
                for value in values {
                    extract_command_modules(&value, &path, "Compose command", refs);
                }
            }
        }
    }

    fn scan_django_settings(&self, dir: &Path, refs: &mut ConfigReferences) {
        for candidate in [
            dir.join("settings.py"),
            dir.join("config").join("settings.py"),
            dir.join("settings").join("base.py"),
        ] {
            let Some(content) = read(&candidate) else { continue };

            for block_key in ["INSTALLED_APPS", "MIDDLEWARE"] {
                let pattern = format!(r"(?s){}\s*=\s*\[(.*?)\]", block_key);
                let Ok(block_re) = Regex::new(&pattern) else { continue };
                let Some(block) = block_re.captures(&content).and_then(|c| c.get(1)) else {
                    continue;
                };
                let string_re = Regex::new(r#"["']([A-Za-z0-9_\.]+)["']"#).unwrap();
                for capture in string_re.captures_iter(block.as_str()) {
                    let dotted = &capture[1];
                    let reason = format!("Django {}", block_key);
                    refs.add_dotted(dotted, &candidate, &reason);
                    if block_key == "INSTALLED_APPS" {
                        // every dotted segment names an app module
                        for part in dotted.split('.') {
                            refs.add_exact(part, &candidate, &reason);
                        }
                    }
                }
            }
        }
    }

    fn scan_airflow_dags(&self, refs: &mut ConfigReferences) {
        let dags_dir = self.project_root.join("dags");
        let Ok(entries) = std::fs::read_dir(&dags_dir) else {
            return;
        };
        let callable_re = Regex::new(r"python_callable\s*=\s*([A-Za-z0-9_]+)").unwrap();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let Some(content) = read(&path) else { continue };
            for capture in callable_re.captures_iter(&content) {
                refs.add_exact(&capture[1], &path, "Airflow python_callable");
            }
        }
    }

    fn scan_package_json(&self, dir: &Path, refs: &mut ConfigReferences) {
        let path = dir.join("package.json");
        let Some(content) = read(&path) else { return };
        let Ok(doc) = serde_json::from_str::<JsonValue>(&content) else {
            return;
        };

        if let Some(scripts) = doc.get("scripts").and_then(JsonValue::as_object) {
            for value in scripts.values() {
                if let Some(command) = value.as_str() {
                    extract_command_modules(command, &path, "npm script", refs);
                }
            }
        }
        match doc.get("bin") {
            Some(JsonValue::String(bin)) => add_file_stem(bin, &path, "package bin", refs),
            Some(JsonValue::Object(bins)) => {
                for value in bins.values() {
                    if let Some(bin) = value.as_str() {
                        add_file_stem(bin, &path, "package bin", refs);
                    }
                }
            }
            _ => {}
        }
        for key in ["main", "module"] {
            if let Some(entry) = doc.get(key).and_then(JsonValue::as_str) {
                add_file_stem(entry, &path, "package entry", refs);
            }
        }
    }

    fn scan_tsconfig(&self, dir: &Path, refs: &mut ConfigReferences) {
        let path = dir.join("tsconfig.json");
        let Some(content) = read(&path) else { return };
        let Ok(doc) = serde_json::from_str::<JsonValue>(&content) else {
            return;
        };
        if let Some(files) = doc.get("files").and_then(JsonValue::as_array) {
            for file in files.iter().filter_map(JsonValue::as_str) {
                add_file_stem(file, &path, "tsconfig files entry", refs);
            }
        }
    }

    fn scan_pyproject(&self, dir: &Path, refs: &mut ConfigReferences) {
        let path = dir.join("pyproject.toml");
        let Some(content) = read(&path) else { return };
        let Ok(doc) = content.parse::<toml::Value>() else {
            return;
        };

        let project = doc.get("project");
        if let Some(scripts) = project
            .and_then(|p| p.get("scripts"))
            .and_then(toml::Value::as_table)
        {
            for value in scripts.values() {
                if let Some(target) = value.as_str() {
                    add_entry_point_target(target, &path, "packaging script", refs);
                }
            }
        }
        if let Some(groups) = project
            .and_then(|p| p.get("entry-points"))
            .and_then(toml::Value::as_table)
        {
            for group in groups.values() {
                if let Some(group) = group.as_table() {
                    for value in group.values() {
                        if let Some(target) = value.as_str() {
                            add_entry_point_target(target, &path, "packaging entry point", refs);
                        }
                    }
                }
            }
        }
    }

    fn scan_workflows(&self, refs: &mut ConfigReferences) {
        let workflows = self.project_root.join(".github").join("workflows");
        let Ok(entries) = std::fs::read_dir(&workflows) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext != Some("yml") && ext != Some("yaml") {
                continue;
            }
            let Some(content) = read(&path) else { continue };
            let Ok(doc) = serde_yaml::from_str::<YamlValue>(&content) else {
                continue;
            };
            let mut runs = Vec::new();
            yaml_values_for_key(&doc, "run", &mut runs);
            for run in runs {
                extract_command_modules(&run, &path, "workflow run step", refs);
            }
        }
    }
}

fn read(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    std::fs::read_to_string(path).ok()
}

/// Collect every string value stored under `key` anywhere in a YAML tree.
fn collect_yaml_key(
    value: &YamlValue,
    key: &str,
    file: &Path,
    reason: &str,
    refs: &mut ConfigReferences,
) {
    let mut values = Vec::new();
    yaml_values_for_key(value, key, &mut values);
    for dotted in values {
        refs.add_dotted(&dotted, file, reason);
    }
}

fn yaml_values_for_key(value: &YamlValue, key: &str, out: &mut Vec<String>) {
    match value {
        YamlValue::Mapping(map) => {
            for (k, v) in map {
                if k.as_str() == Some(key) {
                    match v {
                        YamlValue::String(s) => out.push(s.clone()),
                        YamlValue::Sequence(items) => {
                            for item in items {
                                if let Some(s) = item.as_str() {
                                    out.push(s.to_string());
                                }
                            }
                        }
                        _ => {}
                    }
                }
                yaml_values_for_key(v, key, out);
            }
        }
        YamlValue::Sequence(items) => {
            for item in items {
                yaml_values_for_key(item, key, out);
            }
        }
        _ => {}
    }
}

fn regex_dotted(content: &str, pattern: &str, file: &Path, reason: &str, refs: &mut ConfigReferences) {
    let Ok(re) = Regex::new(pattern) else { return };
    for capture in re.captures_iter(content) {
        refs.add_dotted(&capture[1], file, reason);
    }
}

/// Pull module-looking tokens out of a shell command: dotted paths and the
/// argument of `-m`.
fn extract_command_modules(command: &str, file: &Path, reason: &str, refs: &mut ConfigReferences) {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        if *token == "-m" {
            if let Some(module) = tokens.get(i + 1) {
                refs.add_dotted(module, file, reason);
            }
            continue;
        }
        let dotted = token.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_')
            && token.contains('.')
            && !token.starts_with('.')
            && !token.ends_with('.');
        if dotted && !looks_like_filename(token) {
            refs.add_dotted(token, file, reason);
        }
    }
}

fn looks_like_filename(token: &str) -> bool {
    const FILE_EXTS: &[&str] = &["py", "js", "ts", "sh", "json", "yml", "yaml", "txt", "toml"];
    token
        .rsplit('.')
        .next()
        .map(|ext| FILE_EXTS.contains(&ext))
        .unwrap_or(false)
}

fn add_file_stem(path_str: &str, file: &Path, reason: &str, refs: &mut ConfigReferences) {
    if let Some(stem) = Path::new(path_str).file_stem().and_then(|s| s.to_str()) {
        refs.add_exact(stem, file, reason);
    }
}

/// `pkg.mod:func` packaging targets: the function and the module path both
/// become candidates.
fn add_entry_point_target(target: &str, file: &Path, reason: &str, refs: &mut ConfigReferences) {
    let mut parts = target.splitn(2, ':');
    let module = parts.next().unwrap_or_default().trim();
    let func = parts.next().map(str::trim);
    if !module.is_empty() {
        refs.add_dotted(module, file, reason);
    }
    if let Some(func) = func {
        if !func.is_empty() {
            refs.add_exact(func, file, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_serverless_handler() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "serverless.yml",
            "service: images\nfunctions:\n  upload:\n    handler: handlers.image.upload\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("upload"));
        assert!(refs.contains("handlers.image.upload"));
    }

    #[test]
    fn test_sam_handler_one_level_deep() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "infra/template.yaml",
            "Resources:\n  Fn:\n    Properties:\n      Handler: app.lambda_entry\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("lambda_entry"));
    }

    #[test]
    fn test_django_settings() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "settings.py",
            "INSTALLED_APPS = [\n    'myapp.users',\n]\nMIDDLEWARE = [\n    'middleware.auth.AuthMiddleware',\n]\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("users"));
        assert!(refs.contains("myapp"));
        assert!(refs.contains("AuthMiddleware"));
    }

    #[test]
    fn test_airflow_callable() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "dags/pipeline.py",
            "task = PythonOperator(task_id='t', python_callable=process_data)\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("process_data"));
    }

    #[test]
    fn test_pyproject_scripts() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname = \"tool\"\n\n[project.scripts]\ntool = \"tool.cli:main_entry\"\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("main_entry"));
        assert!(refs.contains("tool.cli"));
    }

    #[test]
    fn test_package_json_bin() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"name": "x", "bin": {"x": "./cli/run.js"}, "scripts": {"start": "node server.main"}}"#,
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("run"));
        assert!(refs.contains("server.main"));
    }

    #[test]
    fn test_compose_dotted_command() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "docker-compose.yml",
            "services:\n  worker:\n    command: celery -A tasks.app worker\n",
        );
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.contains("app"));
        assert!(refs.contains("tasks.app"));
    }

    #[test]
    fn test_empty_project() {
        let dir = TempDir::new().unwrap();
        let refs = ConfigReferenceScanner::new(dir.path()).scan();
        assert!(refs.is_empty());
    }
}
