//! Front-end checks for OpenCL C source on the emulated device.
//!
//! This is not a compiler. It validates what the emulator can validate
//! (build options, comments, delimiter balance, kernel signatures) and
//! binds each `__kernel` entry point to a native implementation.
//! Diagnostics follow the usual `<source>:line:col: error: ...` layout.

use gpusum_types::BuildStatus;

use super::kernels::native_kernel;

const SOURCE_NAME: &str = "<source>";

const KNOWN_OPTIONS: &[&str] = &[
    "-Werror",
    "-w",
    "-cl-mad-enable",
    "-cl-fast-relaxed-math",
    "-cl-finite-math-only",
    "-cl-no-signed-zeros",
    "-cl-unsafe-math-optimizations",
    "-cl-denorms-are-zero",
    "-cl-opt-disable",
    "-cl-single-precision-constant",
    "-cl-kernel-arg-info",
];

const KNOWN_OPTION_PREFIXES: &[&str] = &["-D", "-I", "-cl-std="];

/// A `__kernel` function found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KernelSignature {
    pub name: String,
    pub params: u32,
}

/// Result of checking one program.
#[derive(Debug, Clone)]
pub(crate) struct CompileOutput {
    pub status: BuildStatus,
    pub log: String,
    pub kernels: Vec<KernelSignature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone)]
struct Diagnostic {
    severity: Severity,
    /// Char offset into the source; `None` for command-line diagnostics.
    offset: Option<usize>,
    message: String,
}

impl Diagnostic {
    fn error(offset: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            offset,
            message: message.into(),
        }
    }

    fn warning(offset: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            offset,
            message: message.into(),
        }
    }

    fn note(offset: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            offset: Some(offset),
            message: message.into(),
        }
    }
}

/// Checks `source` under `options`.
pub(crate) fn compile(source: &str, options: &str) -> CompileOutput {
    let chars: Vec<char> = source.chars().collect();
    let mut diagnostics = Vec::new();
    let warnings_as_errors = options.split_whitespace().any(|o| o == "-Werror");
    let suppress_warnings = options.split_whitespace().any(|o| o == "-w");

    check_options(options, &mut diagnostics);

    let mut kernels = Vec::new();
    match strip_comments(&chars) {
        Err(d) => diagnostics.push(d),
        Ok(code) => {
            if check_delimiters(&code, &mut diagnostics) {
                kernels = find_kernels(&code, &mut diagnostics);
                bind_native(&kernels, &mut diagnostics);
                if kernels.is_empty() {
                    diagnostics.push(Diagnostic::warning(
                        None,
                        "program contains no kernel entry points",
                    ));
                }
            }
        }
    }

    if suppress_warnings {
        diagnostics.retain(|d| d.severity != Severity::Warning);
    }
    if warnings_as_errors {
        for d in &mut diagnostics {
            if d.severity == Severity::Warning {
                d.severity = Severity::Error;
                d.message.push_str(" [-Werror]");
            }
        }
    }

    let failed = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let log = render(&chars, &diagnostics);
    CompileOutput {
        status: if failed {
            BuildStatus::Error
        } else {
            BuildStatus::Success
        },
        log,
        kernels: if failed { Vec::new() } else { kernels },
    }
}

fn check_options(options: &str, diagnostics: &mut Vec<Diagnostic>) {
    for option in options.split_whitespace() {
        let known = KNOWN_OPTIONS.contains(&option)
            || KNOWN_OPTION_PREFIXES
                .iter()
                .any(|p| option.starts_with(p) && option.len() > p.len());
        if !known {
            diagnostics.push(Diagnostic::error(
                None,
                format!("unknown argument: '{option}'"),
            ));
        }
    }
}

/// Blanks out comments and literal contents, keeping offsets and newlines.
fn strip_comments(src: &[char]) -> Result<Vec<char>, Diagnostic> {
    let mut out = src.to_vec();
    let mut i = 0;
    while i < src.len() {
        match (src[i], src.get(i + 1).copied()) {
            ('/', Some('/')) => {
                while i < src.len() && src[i] != '\n' {
                    out[i] = ' ';
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                let start = i;
                i += 2;
                loop {
                    if i + 1 >= src.len() {
                        return Err(Diagnostic::error(Some(start), "unterminated /* comment"));
                    }
                    if src[i] == '*' && src[i + 1] == '/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                for c in &mut out[start..i] {
                    if *c != '\n' {
                        *c = ' ';
                    }
                }
            }
            (quote @ ('"' | '\''), _) => {
                let start = i;
                i += 1;
                while i < src.len() && src[i] != quote {
                    if src[i] == '\n' {
                        return Err(Diagnostic::error(
                            Some(start),
                            format!("missing terminating {quote} character"),
                        ));
                    }
                    if src[i] == '\\' {
                        out[i] = ' ';
                        i += 1;
                    }
                    if i < src.len() {
                        out[i] = ' ';
                        i += 1;
                    }
                }
                if i >= src.len() {
                    return Err(Diagnostic::error(
                        Some(start),
                        format!("missing terminating {quote} character"),
                    ));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(out)
}

/// Returns true if every bracket, brace, and parenthesis is matched.
fn check_delimiters(code: &[char], diagnostics: &mut Vec<Diagnostic>) -> bool {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (i, &c) in code.iter().enumerate() {
        match c {
            '(' | '{' | '[' => stack.push((c, i)),
            ')' | '}' | ']' => match stack.pop() {
                Some((open, _)) if closer(open) == c => {}
                Some((open, at)) => {
                    diagnostics.push(Diagnostic::error(
                        Some(i),
                        format!("expected '{}'", closer(open)),
                    ));
                    diagnostics.push(Diagnostic::note(at, format!("to match this '{open}'")));
                    return false;
                }
                None => {
                    diagnostics.push(Diagnostic::error(Some(i), format!("extraneous closing '{c}'")));
                    return false;
                }
            },
            _ => {}
        }
    }
    if let Some((open, at)) = stack.pop() {
        diagnostics.push(Diagnostic::error(
            Some(code.len()),
            format!("expected '{}' at end of input", closer(open)),
        ));
        diagnostics.push(Diagnostic::note(at, format!("to match this '{open}'")));
        return false;
    }
    true
}

fn closer(open: char) -> char {
    match open {
        '(' => ')',
        '{' => '}',
        _ => ']',
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Punct(char),
}

fn tokenize(code: &[char]) -> Vec<(Token, usize)> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < code.len() {
        let c = code[i];
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < code.len() && (code[i].is_ascii_alphanumeric() || code[i] == '_') {
                i += 1;
            }
            tokens.push((Token::Ident(code[start..i].iter().collect()), start));
        } else if c.is_ascii_digit() {
            while i < code.len() && (code[i].is_ascii_alphanumeric() || code[i] == '.') {
                i += 1;
            }
        } else {
            if !c.is_whitespace() {
                tokens.push((Token::Punct(c), i));
            }
            i += 1;
        }
    }
    tokens
}

fn is_ident(token: &Token, name: &str) -> bool {
    matches!(token, Token::Ident(s) if s == name)
}

/// Index one past the parenthesis group opening at `open`.
fn skip_group(tokens: &[(Token, usize)], open: usize) -> usize {
    if tokens.get(open).map(|(t, _)| t) != Some(&Token::Punct('(')) {
        return open;
    }
    let mut depth = 0usize;
    for (j, (token, _)) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn find_kernels(code: &[char], diagnostics: &mut Vec<Diagnostic>) -> Vec<KernelSignature> {
    let tokens = tokenize(code);
    let mut kernels = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let (token, offset) = &tokens[i];
        if !(is_ident(token, "__kernel") || is_ident(token, "kernel")) {
            i += 1;
            continue;
        }
        let kernel_offset = *offset;

        // Qualifiers and return type up to the parameter list.
        let mut j = i + 1;
        let mut saw_void = false;
        while j < tokens.len() && tokens[j].0 != Token::Punct('(') {
            if is_ident(&tokens[j].0, "__attribute__") {
                j = skip_group(&tokens, j + 1);
                continue;
            }
            if is_ident(&tokens[j].0, "void") {
                saw_void = true;
            }
            j += 1;
        }
        if j >= tokens.len() || j == i + 1 {
            diagnostics.push(Diagnostic::error(
                Some(kernel_offset),
                "expected kernel function declaration",
            ));
            break;
        }
        let (name, name_offset) = match &tokens[j - 1] {
            (Token::Ident(name), at) => (name.clone(), *at),
            (_, at) => {
                diagnostics.push(Diagnostic::error(Some(*at), "expected identifier"));
                i = j;
                continue;
            }
        };
        if !saw_void {
            diagnostics.push(Diagnostic::error(
                Some(name_offset),
                format!("kernel function '{name}' must have void return type"),
            ));
        }

        // Count top-level comma-separated parameters.
        let end = skip_group(&tokens, j);
        let inner = &tokens[j + 1..end.saturating_sub(1).max(j + 1)];
        let mut params = 0u32;
        let mut depth = 0usize;
        let mut group_empty = true;
        let mut group_is_void = false;
        for (t, _) in inner {
            match t {
                Token::Punct('(') | Token::Punct('[') => depth += 1,
                Token::Punct(')') | Token::Punct(']') => depth = depth.saturating_sub(1),
                Token::Punct(',') if depth == 0 => {
                    if !group_empty {
                        params += 1;
                    }
                    group_empty = true;
                    group_is_void = false;
                    continue;
                }
                _ => {}
            }
            group_is_void = group_empty && is_ident(t, "void");
            group_empty = false;
        }
        if !group_empty && !(params == 0 && group_is_void) {
            params += 1;
        }

        kernels.push(KernelSignature { name, params });
        i = end;
    }
    kernels
}

fn bind_native(kernels: &[KernelSignature], diagnostics: &mut Vec<Diagnostic>) {
    for kernel in kernels {
        match native_kernel(&kernel.name) {
            None => diagnostics.push(Diagnostic::error(
                None,
                format!(
                    "kernel '{}' has no native implementation on the emulated device",
                    kernel.name
                ),
            )),
            Some(native) if native.params != kernel.params => {
                diagnostics.push(Diagnostic::error(
                    None,
                    format!(
                        "kernel '{}' declares {} parameters, the emulated device implements {}",
                        kernel.name, kernel.params, native.params
                    ),
                ))
            }
            Some(_) => {}
        }
    }
}

/// 1-based line and column of a char offset.
fn line_col(src: &[char], offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for &c in src.iter().take(offset) {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn render(src: &[char], diagnostics: &[Diagnostic]) -> String {
    let mut log = String::new();
    for d in diagnostics {
        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        match d.offset {
            Some(offset) => {
                let (line, col) = line_col(src, offset);
                log.push_str(&format!("{SOURCE_NAME}:{line}:{col}: {severity}: {}\n", d.message));
            }
            None => log.push_str(&format!("{severity}: {}\n", d.message)),
        }
    }
    let errors = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
    if errors > 0 {
        log.push_str(&format!(
            "{errors} error{} generated.\n",
            if errors == 1 { "" } else { "s" }
        ));
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM_SOURCE: &str = include_str!("../../../../kernels/sum.cl");

    #[test]
    fn shipped_kernel_builds_cleanly() {
        let out = compile(SUM_SOURCE, gpusum_types::constants::DEFAULT_BUILD_OPTIONS);
        assert_eq!(out.status, BuildStatus::Success, "log: {}", out.log);
        assert!(out.log.is_empty());
        assert_eq!(
            out.kernels,
            vec![KernelSignature {
                name: "sum".into(),
                params: 3
            }]
        );
    }

    #[test]
    fn missing_brace_reports_position() {
        let src = "__kernel void sum(__global const float* a,\n  __global const float* b, __global float* o) {\n  o[0] = a[0];\n";
        let out = compile(src, "");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("expected '}' at end of input"), "{}", out.log);
        assert!(out.log.contains("<source>:2:"), "{}", out.log);
        assert!(out.log.contains("1 error generated."));
    }

    #[test]
    fn mismatched_closer() {
        let out = compile("__kernel void sum(int a]", "");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("expected ')'"));
        assert!(out.log.contains("note: to match this '('"));
    }

    #[test]
    fn delimiters_inside_comments_are_ignored() {
        let src = "// ) } ]\n/* { ( */ __kernel void sum(__global float* a, __global float* b, __global float* c) { }";
        let out = compile(src, "");
        assert_eq!(out.status, BuildStatus::Success, "{}", out.log);
    }

    #[test]
    fn unterminated_comment() {
        let out = compile("__kernel void sum() { } /* oops", "");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("unterminated /* comment"));
    }

    #[test]
    fn unknown_entry_point_has_no_native_implementation() {
        let out = compile("__kernel void scale(__global float* a) { }", "");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("'scale' has no native implementation"));
    }

    #[test]
    fn wrong_parameter_count() {
        let out = compile("__kernel void sum(__global float* a, __global float* b) { }", "");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("declares 2 parameters"));
    }

    #[test]
    fn non_void_kernel_rejected() {
        let out = compile(
            "__kernel int sum(__global float* a, __global float* b, __global float* c) { return 0; }",
            "",
        );
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("must have void return type"));
    }

    #[test]
    fn unknown_option_is_an_error() {
        let out = compile(SUM_SOURCE, "-cl-mad-enable -fancy");
        assert_eq!(out.status, BuildStatus::Error);
        assert!(out.log.contains("unknown argument: '-fancy'"));
    }

    #[test]
    fn empty_program_warns_and_werror_promotes() {
        let warn_only = compile("float helper(float x) { return x; }", "");
        assert_eq!(warn_only.status, BuildStatus::Success);
        assert!(warn_only.log.contains("warning: program contains no kernel entry points"));

        let strict = compile("float helper(float x) { return x; }", "-Werror");
        assert_eq!(strict.status, BuildStatus::Error);
        assert!(strict.log.contains("[-Werror]"));
    }

    #[test]
    fn void_parameter_list_counts_zero() {
        let src = "__kernel void sum(void) { }";
        let chars: Vec<char> = src.chars().collect();
        let mut diags = Vec::new();
        let kernels = find_kernels(&chars, &mut diags);
        assert_eq!(kernels[0].params, 0);
    }
}
