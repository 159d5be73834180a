//! Deterministic text for graph nodes: identifier-safe descriptors for
//! variable names, exact structural keys for register-file indices, and
//! host expressions for values known at translation time.

use super::{BuiltIn, Graph, Node, NodeId, Ty};
use crate::diagnostic::Diagnostic;
use crate::tcg::op::HostExpr;

fn literal(value: u64) -> String {
    if value < 10 {
        value.to_string()
    } else {
        format!("{:#x}", value)
    }
}

fn ident(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Short identifier-safe description of a node, used inside generated
/// variable names.
pub fn describe(graph: &Graph, id: NodeId) -> String {
    let Some(node) = graph.get(id) else {
        return format!("dead_{}", id.0);
    };
    match node {
        Node::Constant { value, .. } => literal(*value),
        Node::Field { name, .. } | Node::Param { name, .. } | Node::Let { name, .. } => ident(name),
        Node::FuncCall { name, .. } => ident(name),
        Node::StaticPc { .. } => "pc".to_string(),
        Node::ReadReg { reg, .. } | Node::WriteReg { reg, .. } => ident(&reg.name),
        Node::ReadRegFile { file, index, .. } | Node::WriteRegFile { file, index, .. } => {
            format!("{}_{}", ident(&file.name), index_desc(graph, *index))
        }
        Node::ReadMem { .. } => "ld".to_string(),
        Node::WriteMem { .. } => "st".to_string(),
        Node::BuiltIn { op, .. } => ident(op.name()),
        Node::SignExtend { .. } => "sext".to_string(),
        Node::ZeroExtend { .. } => "zext".to_string(),
        Node::Truncate { .. } => "trunc".to_string(),
        Node::ExprSave { .. } => "save".to_string(),
        Node::TupleGet { index, .. } => format!("get{}", index),
        Node::Select { .. } => "select".to_string(),
        Node::Slice { msb, lsb, .. } => format!("slice{}_{}", msb, lsb),
        Node::Cast { .. } => "cast".to_string(),
        Node::VarRef { var, .. } => var.name.clone(),
        other => ident(other.kind_name()),
    }
}

/// Readable, identifier-safe description of a register-file index. Not
/// unique: `RS1` and `rs1` describe alike. Use `index_key` for identity.
pub fn index_desc(graph: &Graph, id: NodeId) -> String {
    match graph.get(id) {
        Some(Node::Field { name, .. }) | Some(Node::Param { name, .. }) => ident(name),
        Some(Node::Constant { value, .. }) => literal(*value),
        Some(Node::StaticPc { .. }) => "pc".to_string(),
        Some(Node::BuiltIn { op, args, .. }) => {
            let mut desc = ident(op.name());
            for arg in args {
                desc.push('_');
                desc.push_str(&index_desc(graph, *arg));
            }
            desc
        }
        Some(Node::ZeroExtend { value, .. })
        | Some(Node::SignExtend { value, .. })
        | Some(Node::Truncate { value, .. })
        | Some(Node::Cast { value, .. }) => index_desc(graph, *value),
        _ => format!("{}_n{}", describe(graph, id), id.0),
    }
}

fn width(graph: &Graph, id: NodeId) -> String {
    match graph.get(id).and_then(Node::ty) {
        Some(Ty::Bits(n)) => n.to_string(),
        Some(ty) => ty.to_string(),
        None => String::new(),
    }
}

/// Structural key of a register-file index expression. Two index
/// expressions with the same key address the same element: every node
/// kind, width and name is part of the key, names are quoted.
pub fn index_key(graph: &Graph, id: NodeId) -> String {
    let unary = |kind: &str, value: NodeId| {
        format!("{}{}({})", kind, width(graph, id), index_key(graph, value))
    };
    match graph.get(id) {
        Some(Node::Field { name, .. }) => format!("field{}({:?})", width(graph, id), name),
        Some(Node::Param { name, .. }) => format!("param{}({:?})", width(graph, id), name),
        Some(Node::Constant { value, .. }) => format!("const{}({})", width(graph, id), value),
        Some(Node::StaticPc { .. }) => format!("pc{}", width(graph, id)),
        Some(Node::BuiltIn { op, args, .. }) => {
            let args: Vec<String> = args.iter().map(|a| index_key(graph, *a)).collect();
            format!("{}{}({})", op.name(), width(graph, id), args.join(","))
        }
        Some(Node::ZeroExtend { value, .. }) => unary("zext", *value),
        Some(Node::SignExtend { value, .. }) => unary("sext", *value),
        Some(Node::Truncate { value, .. }) => unary("trunc", *value),
        Some(Node::Cast { value, .. }) => unary("cast", *value),
        Some(Node::Slice { value, msb, lsb, .. }) => {
            format!("slice{}_{}({})", msb, lsb, index_key(graph, *value))
        }
        _ => format!("#{}", id.0),
    }
}

fn infix(op: BuiltIn) -> Option<&'static str> {
    Some(match op {
        BuiltIn::Add => "+",
        BuiltIn::Sub => "-",
        BuiltIn::Mul => "*",
        BuiltIn::And => "&",
        BuiltIn::Or => "|",
        BuiltIn::Xor => "^",
        BuiltIn::Equ => "==",
        BuiltIn::Neq => "!=",
        BuiltIn::Slth | BuiltIn::Ulth => "<",
        BuiltIn::Sleq | BuiltIn::Uleq => "<=",
        BuiltIn::Sgth | BuiltIn::Ugth => ">",
        BuiltIn::Sgeq | BuiltIn::Ugeq => ">=",
        BuiltIn::Lsl => "<<",
        BuiltIn::Lsr | BuiltIn::Asr => ">>",
        BuiltIn::SDiv | BuiltIn::UDiv => "/",
        BuiltIn::SMod | BuiltIn::UMod => "%",
        _ => return None,
    })
}

fn render(graph: &Graph, id: NodeId) -> Result<String, Diagnostic> {
    let node = graph.node(id)?;
    let text = match node {
        Node::Constant { value, .. } => literal(*value),
        Node::Field { name, .. } | Node::Param { name, .. } | Node::Let { name, .. } => name.clone(),
        Node::StaticPc { .. } => "pc".to_string(),
        Node::BuiltIn { op, args, .. } => {
            let args = args
                .iter()
                .map(|a| render(graph, *a))
                .collect::<Result<Vec<_>, _>>()?;
            match (infix(*op), args.as_slice()) {
                (Some(sym), [a, b]) => format!("({} {} {})", a, sym, b),
                (_, [a]) if *op == BuiltIn::Not => format!("~{}", a),
                (_, [a]) if *op == BuiltIn::Neg => format!("-{}", a),
                _ => format!("{}({})", ident(op.name()), args.join(", ")),
            }
        }
        Node::SignExtend { value, .. } => {
            format!("sext({}, {})", render(graph, *value)?, graph.bits(*value)?)
        }
        Node::Truncate { value, .. } => {
            format!("trunc({}, {})", render(graph, *value)?, graph.bits(id)?)
        }
        Node::ZeroExtend { value, .. } | Node::ExprSave { value, .. } | Node::Cast { value, .. } => {
            render(graph, *value)?
        }
        Node::Slice { value, msb, lsb, .. } => {
            format!("{}<{}..{}>", render(graph, *value)?, msb, lsb)
        }
        Node::Select {
            condition,
            if_true,
            if_false,
            ..
        } => format!(
            "({} ? {} : {})",
            render(graph, *condition)?,
            render(graph, *if_true)?,
            render(graph, *if_false)?
        ),
        Node::VarRef { var, .. } => var.name.clone(),
        other => {
            return Err(Diagnostic::internal(
                format!(
                    "{} node {} has no translation-time value",
                    other.kind_name(),
                    id
                ),
                graph.span(id),
            ))
        }
    };
    Ok(text)
}

/// Render a translation-time value as a host expression.
pub fn host_expr(graph: &Graph, id: NodeId) -> Result<HostExpr, Diagnostic> {
    Ok(HostExpr {
        node: id,
        text: render(graph, id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use crate::isa::RegisterFile;

    #[test]
    fn test_host_expr_of_pc_relative_target() {
        let mut b = GraphBuilder::new();
        let pc = b.static_pc(64);
        let imm = b.field("imm", 64);
        let target = b.builtin(BuiltIn::Add, &[pc, imm], 64);
        let graph = b.finish();
        assert_eq!(host_expr(&graph, target).unwrap().text, "(pc + imm)");
    }

    #[test]
    fn test_large_constants_render_hex() {
        let mut b = GraphBuilder::new();
        let small = b.constant(4, 64);
        let big = b.constant(4096, 64);
        let graph = b.finish();
        assert_eq!(host_expr(&graph, small).unwrap().text, "4");
        assert_eq!(host_expr(&graph, big).unwrap().text, "0x1000");
    }

    #[test]
    fn test_runtime_value_has_no_host_expr() {
        let x = RegisterFile::new("X", 5, 64);
        let mut b = GraphBuilder::new();
        let rs1 = b.field("rs1", 5);
        let read = b.read_reg_file(&x, rs1);
        let graph = b.finish();
        let err = host_expr(&graph, read).unwrap_err();
        assert!(err.message.contains("register file read"));
    }

    #[test]
    fn test_index_key_is_structural() {
        let mut b = GraphBuilder::new();
        let a = b.field("rs1", 5);
        let b1 = b.field("rs1", 5);
        let one = b.constant(1, 5);
        let sum = b.builtin(BuiltIn::Add, &[a, one], 5);
        let graph = b.finish();
        assert_eq!(index_key(&graph, a), index_key(&graph, b1));
        assert_eq!(index_key(&graph, sum), r#"ADD5(field5("rs1"),const5(1))"#);
        assert_eq!(index_desc(&graph, sum), "add_rs1_1");
    }

    #[test]
    fn test_index_key_separates_lookalikes() {
        let mut b = GraphBuilder::new();
        let idx = b.field("idx", 3);
        let sext = b.sign_extend(idx, 6);
        let zext = b.zero_extend(idx, 6);
        let upper = b.field("RS1", 5);
        let lower = b.field("rs1", 5);
        let named = b.field("add_rs1_1", 5);
        let one = b.constant(1, 5);
        let sum = b.builtin(BuiltIn::Add, &[lower, one], 5);
        let graph = b.finish();

        assert_ne!(index_key(&graph, sext), index_key(&graph, zext));
        assert_ne!(index_key(&graph, upper), index_key(&graph, lower));
        assert_ne!(index_key(&graph, named), index_key(&graph, sum));
        // The readable descriptions still collide.
        assert_eq!(index_desc(&graph, sext), index_desc(&graph, zext));
        assert_eq!(index_desc(&graph, named), index_desc(&graph, sum));
    }

    #[test]
    fn test_describe_register_file_read() {
        let x = RegisterFile::new("X", 5, 64);
        let mut b = GraphBuilder::new();
        let rs2 = b.field("rs2", 5);
        let read = b.read_reg_file(&x, rs2);
        let graph = b.finish();
        assert_eq!(describe(&graph, read), "x_rs2");
    }
}
