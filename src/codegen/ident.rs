//! Identifier sanitization per target language

use md5::{Digest, Md5};

/// How a name that collides with a reserved word is escaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordEscape {
    Prefix(&'static str),
    Suffix(&'static str),
}

/// Rules for turning a free-form diagram name into an identifier of one language
#[derive(Debug, Clone, Copy)]
pub struct IdentStyle {
    /// Characters allowed besides ASCII alphanumerics and `_`
    pub extra_chars: &'static [char],
    /// Fold to lower case (case-insensitive languages)
    pub lowercase: bool,
    /// Prepended when the first character may not start an identifier
    pub start_prefix: &'static str,
    /// Only digits need `start_prefix`; otherwise anything but a letter does
    pub digits_only_need_prefix: bool,
    /// Result for an empty input
    pub empty: &'static str,
    /// Result when nothing survives sanitization
    pub sanitized_empty: &'static str,
    pub keywords: &'static [&'static str],
    pub keyword_escape: KeywordEscape,
    /// Fall back to a hashed name when the input held only non-ASCII text
    pub hash_fallback: bool,
}

impl IdentStyle {
    /// Sanitize `raw`: disallowed characters become `_`, runs of `_` collapse,
    /// outer `_` are stripped, then start and keyword rules apply.
    pub fn sanitize(&self, raw: &str) -> String {
        if raw.is_empty() {
            return self.empty.to_string();
        }

        let mut out = String::with_capacity(raw.len());
        for c in raw.chars() {
            let c = if self.lowercase { c.to_ascii_lowercase() } else { c };
            let allowed = c.is_ascii_alphanumeric() || c == '_' || self.extra_chars.contains(&c);
            let c = if allowed { c } else { '_' };
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }

        let trimmed = out.trim_matches('_');
        if trimmed.is_empty() {
            if self.hash_fallback && !raw.is_ascii() {
                return format!("{}id_{}", self.start_prefix, short_hash(raw));
            }
            return self.sanitized_empty.to_string();
        }

        let mut ident = match trimmed.chars().next() {
            Some(first) if self.needs_prefix(first) => format!("{}{}", self.start_prefix, trimmed),
            _ => trimmed.to_string(),
        };

        if self.is_keyword(&ident) {
            ident = match self.keyword_escape {
                KeywordEscape::Prefix(prefix) => format!("{prefix}{ident}"),
                KeywordEscape::Suffix(suffix) => format!("{ident}{suffix}"),
            };
        }
        ident
    }

    pub fn is_keyword(&self, ident: &str) -> bool {
        self.keywords.contains(&ident)
    }

    fn needs_prefix(&self, first: char) -> bool {
        if self.digits_only_need_prefix {
            first.is_ascii_digit()
        } else {
            !first.is_ascii_alphabetic()
        }
    }
}

fn short_hash(raw: &str) -> String {
    let digest = Md5::digest(raw.as_bytes());
    digest.iter().take(3).map(|b| format!("{b:02x}")).collect()
}

/// `toggle_switch` -> `ToggleSwitch`, used for Python class names
pub fn pascal_case(raw: &str) -> String {
    let snake = PYTHON.sanitize(raw);
    let mut out = String::with_capacity(snake.len());
    for part in snake.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "Fsm");
    }
    if PYTHON.is_keyword(&out) {
        out.push('_');
    }
    out
}

/// Append `_2`, `_3`, ... to `base` until it is not in `taken`, then record it
pub fn unique_name(base: String, taken: &mut Vec<String>) -> String {
    let mut name = base.clone();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{base}_{n}");
        n += 1;
    }
    taken.push(name.clone());
    name
}

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Bool", "_Complex", "_Imaginary", "bool",
    "true", "false", "class", "public", "private", "protected", "new", "delete", "this", "try",
    "catch", "throw", "namespace", "template", "typename", "virtual", "explicit", "operator",
];

const VHDL_KEYWORDS: &[&str] = &[
    "abs", "access", "after", "alias", "all", "and", "architecture", "array", "assert",
    "attribute", "begin", "block", "body", "buffer", "bus", "case", "component",
    "configuration", "constant", "disconnect", "downto", "else", "elsif", "end", "entity", "exit",
    "file", "for", "function", "generate", "generic", "group", "guarded", "if", "impure", "in",
    "inertial", "inout", "is", "label", "library", "linkage", "literal", "loop", "map", "mod",
    "nand", "new", "next", "nor", "not", "null", "of", "on", "open", "or", "others", "out",
    "package", "port", "postponed", "procedure", "process", "pure", "range", "record",
    "register", "reject", "rem", "report", "return", "rol", "ror", "select", "severity",
    "signal", "shared", "sla", "sll", "sra", "srl", "subtype", "then", "to", "transport", "type",
    "unaffected", "units", "until", "use", "variable", "wait", "when", "while", "with", "xnor",
    "xor",
];

const VERILOG_KEYWORDS: &[&str] = &[
    "always", "and", "assign", "automatic", "begin", "buf", "bufif0", "bufif1", "case", "casex",
    "casez", "cell", "cmos", "config", "deassign", "default", "defparam", "design", "disable",
    "edge", "else", "end", "endcase", "endconfig", "endfunction", "endgenerate", "endmodule",
    "endprimitive", "endspecify", "endtable", "endtask", "event", "for", "force", "forever",
    "fork", "function", "generate", "genvar", "highz0", "highz1", "if", "ifnone", "incdir",
    "include", "initial", "inout", "input", "instance", "integer", "join", "large", "liblist",
    "library", "localparam", "macromodule", "medium", "module", "nand", "negedge", "nmos", "nor",
    "noshowcancelled", "not", "notif0", "notif1", "or", "output", "parameter", "pmos", "posedge",
    "primitive", "pull0", "pull1", "pulldown", "pullup", "pulsestyle_ondetect",
    "pulsestyle_onevent", "rcmos", "real", "realtime", "reg", "release", "repeat", "rnmos",
    "rpmos", "rtran", "rtranif0", "rtranif1", "scalared", "showcancelled", "signed", "small",
    "specify", "specparam", "strong0", "strong1", "supply0", "supply1", "table", "task", "time",
    "tran", "tranif0", "tranif1", "tri", "tri0", "tri1", "triand", "trior", "trireg", "unsigned",
    "use", "uwire", "vectored", "wait", "wand", "weak0", "weak1", "while", "wire", "wor", "xnor",
    "xor",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

pub const C: IdentStyle = IdentStyle {
    extra_chars: &[],
    lowercase: false,
    start_prefix: "s_",
    digits_only_need_prefix: true,
    empty: "s_Unnamed",
    sanitized_empty: "s_SanitizedEmpty",
    keywords: C_KEYWORDS,
    keyword_escape: KeywordEscape::Prefix("fsm_"),
    hash_fallback: false,
};

pub const VHDL: IdentStyle = IdentStyle {
    extra_chars: &[],
    lowercase: true,
    start_prefix: "fsm_",
    digits_only_need_prefix: false,
    empty: "fsm_unnamed",
    sanitized_empty: "fsm_unnamed",
    keywords: VHDL_KEYWORDS,
    keyword_escape: KeywordEscape::Prefix("fsm_"),
    hash_fallback: false,
};

pub const VERILOG: IdentStyle = IdentStyle {
    extra_chars: &['$'],
    lowercase: false,
    start_prefix: "fsm_",
    digits_only_need_prefix: false,
    empty: "fsm_unnamed",
    sanitized_empty: "fsm_unnamed",
    keywords: VERILOG_KEYWORDS,
    keyword_escape: KeywordEscape::Prefix("fsm_"),
    hash_fallback: false,
};

pub const PYTHON: IdentStyle = IdentStyle {
    extra_chars: &[],
    lowercase: false,
    start_prefix: "s_",
    digits_only_need_prefix: true,
    empty: "s_unnamed",
    sanitized_empty: "s_sanitized_empty",
    keywords: PYTHON_KEYWORDS,
    keyword_escape: KeywordEscape::Suffix("_"),
    hash_fallback: true,
};
