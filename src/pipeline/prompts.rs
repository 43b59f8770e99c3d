//! Planner prompt templates for each pipeline stage.

use std::collections::BTreeMap;

use super::context::RepoContext;

pub fn select_mode(instruction: &str) -> String {
    format!(
        "Analyze the request: \"{}\"\n\
         Choose ONE search mode for finding the files to change:\n\
         - literal: search file contents for a keyword\n\
         - pattern: match file names against a glob pattern\n\
         - wildcard: list source files by extension\n\
         Return ONLY the word (no explanation).",
        instruction
    )
}

pub fn extract_keyword(instruction: &str) -> String {
    format!(
        "Extract the main keyword to search the code for from: \"{}\". Return ONLY the keyword.",
        instruction
    )
}

pub fn extract_pattern(instruction: &str) -> String {
    format!(
        "Extract a filename pattern (e.g., \"*.ts\" or \"*math*\") from: \"{}\". Return ONLY the pattern.",
        instruction
    )
}

pub fn plan_new_files(instruction: &str, repo: &RepoContext) -> String {
    format!(
        "User request: \"{instruction}\"\n\n\
         Repository context:\n{context}\n\n\
         IMPORTANT RULES:\n\
         1. Match the existing technology stack (if React exists, use .tsx; if plain TS, use .ts)\n\
         2. Match the existing directory structure (if src/ exists, use it)\n\
         3. Create MINIMAL files - only what's necessary\n\
         4. If it's a simple request, create just ONE file\n\
         5. Don't create test files unless the repo already has tests\n\
         6. Don't create CSS files unless specifically requested or if the repo uses them\n\n\
         Analyze the request and decide what new files need to be created.\n\
         Return a JSON array (minimum 1 file, maximum 3 files):\n\n\
         [\n  {{\n    \"file\": \"path/to/file.ts\",\n    \"reason\": \"why this file is needed\",\n    \"relevance\": 90,\n    \"action\": \"create\",\n    \"goal\": \"what this file should contain\"\n  }}\n]\n\n\
         Return ONLY the JSON array, no markdown formatting.",
        instruction = instruction,
        context = repo.render(),
    )
}

pub fn plan_changes(
    instruction: &str,
    repo: &RepoContext,
    contents: &BTreeMap<String, String>,
    context_chars: usize,
    max_entries: usize,
    validation_feedback: Option<&str>,
) -> String {
    let files = contents
        .iter()
        .map(|(path, content)| {
            let excerpt: String = content.chars().take(context_chars).collect();
            format!("File: {}\n{}", path, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let feedback = match validation_feedback {
        Some(output) => format!(
            "\nThe previous attempt failed the repository's verification command:\n```\n{}\n```\nFix these problems.\n",
            output
        ),
        None => String::new(),
    };

    format!(
        "User request: \"{instruction}\"\n\n\
         Repository context:\n{context}\n\n\
         Here are the relevant existing files:\n{files}\n{feedback}\n\
         IMPORTANT RULES:\n\
         1. Match the existing technology stack and patterns\n\
         2. Prefer EDITING existing files over creating new ones when possible\n\
         3. Create MINIMAL new files - only what's absolutely necessary\n\
         4. Don't create test files unless the repo already has tests\n\
         5. Keep file extensions consistent with the repo (.ts vs .tsx vs .js)\n\n\
         Decide which existing files to EDIT (preferred), which new files to CREATE \
         (only if necessary) and which files to DELETE (if any).\n\
         Give every entry a relevance score from 0 to 100.\n\n\
         Return a JSON array with the complete plan (maximum {max_entries} files):\n\n\
         [\n  {{\n    \"file\": \"path/to/existing.ts\",\n    \"reason\": \"why this file needs changes\",\n    \"relevance\": 85,\n    \"action\": \"edit\",\n    \"goal\": \"specific change to make\"\n  }}\n]\n\n\
         Use \"edit\" for existing files, \"create\" for new files and \"delete\" for removals.\n\
         Return ONLY the JSON array, no markdown formatting.",
        instruction = instruction,
        context = repo.render(),
        files = files,
        feedback = feedback,
        max_entries = max_entries,
    )
}

fn language_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "tsx" => "React TypeScript",
        "ts" => "TypeScript",
        "jsx" => "React JavaScript",
        "js" | "mjs" | "cjs" => "JavaScript",
        "vue" => "Vue",
        "rs" => "Rust",
        "py" => "Python",
        "go" => "Go",
        _ => "plain",
    }
}

pub fn generate_file(path: &str, goal: &str, instruction: &str) -> String {
    format!(
        "Generate a complete, production-ready file for: {path}\n\n\
         Goal: {goal}\n\
         User request: {instruction}\n\n\
         Requirements:\n\
         - Write complete, working, MINIMAL code\n\
         - Include proper imports and exports\n\
         - Add comments only where necessary\n\
         - Keep it simple - don't over-engineer\n\
         - Match the style of a {language} project\n\n\
         Return ONLY the file content, no explanation or markdown code blocks.",
        path = path,
        goal = goal,
        instruction = instruction,
        language = language_for(path),
    )
}

pub fn edit_file(path: &str, existing: &str, goal: &str, instruction: &str) -> String {
    format!(
        "You are editing this file: {path}\n\n\
         Current content:\n```\n{existing}\n```\n\n\
         User request: {instruction}\n\
         Change goal: {goal}\n\n\
         Generate the COMPLETE modified file content that fulfills the user's request.\n\
         - Keep existing code that doesn't need changes\n\
         - Make the specific changes needed\n\
         - Maintain proper formatting and style\n\n\
         Return ONLY the full file content, no explanation or markdown code blocks.",
        path = path,
        existing = existing,
        instruction = instruction,
        goal = goal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_changes_truncates_file_excerpts() {
        let mut contents = BTreeMap::new();
        contents.insert("src/big.ts".to_string(), "x".repeat(5000));
        let prompt = plan_changes("add divide", &RepoContext::default(), &contents, 1500, 5, None);
        assert!(prompt.contains(&"x".repeat(1500)));
        assert!(!prompt.contains(&"x".repeat(1501)));
        assert!(prompt.contains("maximum 5 files"));
    }

    #[test]
    fn test_plan_changes_includes_validation_feedback() {
        let contents = BTreeMap::from([("a.ts".to_string(), "let a = 1".to_string())]);
        let prompt = plan_changes("x", &RepoContext::default(), &contents, 100, 5, Some("error TS2304"));
        assert!(prompt.contains("error TS2304"));
    }

    #[test]
    fn test_generate_file_names_language() {
        assert!(generate_file("src/App.tsx", "g", "i").contains("React TypeScript"));
        assert!(generate_file("lib/math.ts", "g", "i").contains("a TypeScript project"));
    }
}
