// This module implements the code assembler, which renders a lowered HybridProgram as C text.
// The declaration blob carries the predict prototype and the record struct whose field types
// come from the program's RecordLayout. The definition blob carries the static packed table,
// then the predict function: the inline statement tree followed by the shared fallback block
// that walks the table from the subroot cursor. The cursor and the fallback block are emitted
// only when at least one fallback site exists, so fully inlined trees contain no dead label.

//! C source rendering.

use super::emitter::Stmt;
use super::HybridProgram;
use crate::core::CompilationSession;

/// Declaration and definition text of one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Header contents: predict prototype and record struct.
    pub declaration: String,
    /// Source contents: packed table and predict function.
    pub definition: String,
}

/// Generated C identifiers of one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbols<'a> {
    pub record: &'a str,
    pub table: &'a str,
    pub predict: &'a str,
    pub fallback: &'a str,
}

impl<'arena> Symbols<'arena> {
    /// Intern the symbols of tree `tree_id` in `namespace`.
    pub fn intern(session: &CompilationSession<'arena>, namespace: &str, tree_id: u32) -> Self {
        Self {
            record: session.intern_str(&format!("{}_Node{}", namespace, tree_id)),
            table: session.intern_str(&format!("{}_tree{}", namespace, tree_id)),
            predict: session.intern_str(&format!("{}_predict{}", namespace, tree_id)),
            fallback: session.intern_str(&format!("{}_fallback{}", namespace, tree_id)),
        }
    }
}

fn tabs(depth: usize) -> String {
    "\t".repeat(depth)
}

fn prototype(program: &HybridProgram<'_>) -> String {
    let tree = program.tree();
    format!(
        "unsigned int {}({} const pX[{}])",
        program.symbols().predict,
        tree.feature_type().c_name(),
        tree.dim()
    )
}

/// Render the header blob.
pub fn render_declaration(program: &HybridProgram<'_>) -> String {
    let layout = program.layout();
    let mut output = String::new();
    output.push_str("#include <stdbool.h>\n\n");
    output.push_str(&format!("{};\n\n", prototype(program)));
    output.push_str(&format!("struct {} {{\n", program.symbols().record));
    output.push_str("\tbool isLeaf;\n");
    output.push_str("\tunsigned int prediction;\n");
    output.push_str(&format!("\t{} feature;\n", layout.feature));
    output.push_str(&format!("\t{} split;\n", layout.split));
    output.push_str(&format!("\t{} leftChild;\n", layout.index));
    output.push_str(&format!("\t{} rightChild;\n", layout.index));
    output.push_str("};\n");
    output
}

/// Render the static table literal.
pub fn render_table(program: &HybridProgram<'_>) -> String {
    let symbols = program.symbols();
    let split_type = program.layout().split;
    let table = program.table();
    let mut output = String::new();
    output.push_str(&format!(
        "static const struct {} {}[{}] = {{\n",
        symbols.record,
        symbols.table,
        table.len()
    ));
    for entry in table.entries() {
        output.push_str(&format!(
            "\t{{{}, {}, {}, {}, {}, {}}},\n",
            entry.is_leaf,
            entry.prediction,
            entry.feature,
            split_type.literal(entry.split),
            entry.left_child,
            entry.right_child
        ));
    }
    output.push_str("};\n");
    output
}

fn render_stmt(output: &mut String, program: &HybridProgram<'_>, stmt: &Stmt<'_>, depth: usize) {
    let indent = tabs(depth);
    match stmt {
        Stmt::Return { prediction } => {
            output.push_str(&format!("{}return {};\n", indent, prediction));
        }
        Stmt::Fallback { subroot, .. } => {
            output.push_str(&format!("{}subroot = {};\n", indent, subroot));
            output.push_str(&format!("{}goto {};\n", indent, program.symbols().fallback));
        }
        Stmt::Branch {
            feature,
            threshold,
            comparison,
            then_arm,
            else_arm,
            ..
        } => {
            output.push_str(&format!(
                "{}if (pX[{}] {} {}) {{\n",
                indent,
                feature,
                comparison.symbol(),
                program.layout().split.literal(*threshold)
            ));
            render_stmt(output, program, then_arm, depth + 1);
            output.push_str(&format!("{}}} else {{\n", indent));
            render_stmt(output, program, else_arm, depth + 1);
            output.push_str(&format!("{}}}\n", indent));
        }
    }
}

fn render_fallback_block(output: &mut String, program: &HybridProgram<'_>) {
    let symbols = program.symbols();
    let table = symbols.table;
    output.push_str(&format!("{}:\n", symbols.fallback));
    output.push_str("\t{\n");
    output.push_str(&format!("\t\t{} i = subroot;\n", program.layout().index));
    output.push_str(&format!("\t\twhile (!{}[i].isLeaf) {{\n", table));
    output.push_str(&format!(
        "\t\t\tif (pX[{t}[i].feature] <= {t}[i].split) {{\n",
        t = table
    ));
    output.push_str(&format!("\t\t\t\ti = {}[i].leftChild;\n", table));
    output.push_str("\t\t\t} else {\n");
    output.push_str(&format!("\t\t\t\ti = {}[i].rightChild;\n", table));
    output.push_str("\t\t\t}\n");
    output.push_str("\t\t}\n");
    output.push_str(&format!("\t\treturn {}[i].prediction;\n", table));
    output.push_str("\t}\n");
}

/// Render the source blob.
pub fn render_definition(program: &HybridProgram<'_>) -> String {
    let mut output = render_table(program);
    output.push('\n');
    output.push_str(&format!("{} {{\n", prototype(program)));

    let has_fallback = program.fallback_sites() > 0;
    if has_fallback {
        output.push_str(&format!("\t{} subroot;\n", program.layout().index));
    }
    render_stmt(&mut output, program, program.body(), 1);
    if has_fallback {
        render_fallback_block(&mut output, program);
    }

    output.push_str("}\n");
    output
}

/// Render both blobs.
pub fn assemble(program: &HybridProgram<'_>) -> GeneratedCode {
    GeneratedCode {
        declaration: render_declaration(program),
        definition: render_definition(program),
    }
}
