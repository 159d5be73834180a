use super::builder::GraphBuilder;
use super::*;
use crate::isa::RegisterFile;
use crate::tcg::op::Label;

fn spine(graph: &Graph) -> Vec<&'static str> {
    graph
        .control_order()
        .into_iter()
        .map(|id| graph.node(id).unwrap().kind_name())
        .collect()
}

#[test]
fn test_empty_graph_shape() {
    let graph = GraphBuilder::new().finish();
    assert_eq!(spine(&graph), vec!["start", "instruction end"]);
    assert!(graph.start().is_ok());
    assert!(graph.instr_end().is_ok());
}

#[test]
fn test_reads_are_scheduled_and_constants_are_not() {
    let x = RegisterFile::new("X", 5, 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let read = b.read_reg_file(&x, rs1);
    let one = b.constant(1, 64);
    let folded = b.builtin(BuiltIn::Add, &[one, one], 64);
    let sum = b.builtin(BuiltIn::Add, &[read, one], 64);
    assert!(b.is_runtime(read));
    assert!(!b.is_runtime(folded));
    assert!(b.is_runtime(sum));
    let graph = b.finish();

    let scheduled: Vec<NodeId> = graph
        .iter()
        .filter_map(|(_, n)| match n {
            Node::Scheduled { node, .. } => Some(*node),
            _ => None,
        })
        .collect();
    assert_eq!(scheduled, vec![read, sum]);
}

#[test]
fn test_if_region_order() {
    let x = RegisterFile::new("X", 5, 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let cond = b.read_reg_file(&x, rs1);
    b.if_else(
        cond,
        |b| {
            let rd = b.field("rd", 5);
            let one = b.constant(1, 64);
            b.write_reg_file(&x, rd, one);
        },
        |_| {},
    );
    let graph = b.finish();
    assert_eq!(
        spine(&graph),
        vec![
            "start",
            "scheduled",
            "if",
            "branch begin",
            "scheduled",
            "branch end",
            "branch begin",
            "branch end",
            "merge",
            "instruction end",
        ]
    );
}

#[test]
fn test_builder_links_every_construct_both_ways() {
    let x = RegisterFile::new("X", 5, 64);
    let pc = crate::isa::Register::new("PC", 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let cond = b.read_reg_file(&x, rs1);
    b.if_else(
        cond,
        |b| {
            b.if_then(cond, |b| {
                b.raise("ECALL", &[]);
            });
            let here = b.static_pc(64);
            b.jump(&pc, here);
        },
        |b| {
            let rd = b.field("rd", 5);
            b.write_reg_file(&x, rd, cond);
        },
    );
    let graph = b.finish();

    let order = graph.control_order();
    assert_eq!(order.last(), Some(&graph.instr_end().unwrap()));
    for id in order {
        let node = graph.node(id).unwrap();
        if let Some(next) = node.next() {
            assert!(node.is_directional());
            assert_eq!(graph.pred(next), Some(id), "back edge of {}", id);
        }
        if let Node::If {
            true_branch,
            false_branch,
            ..
        } = node
        {
            assert_eq!(graph.pred(*true_branch), Some(id));
            assert_eq!(graph.pred(*false_branch), Some(id));
        }
    }
    assert_eq!(graph.iter().filter(|(_, n)| n.kind_name() == "raise").count(), 1);
}

#[test]
fn test_side_effects_are_recorded_per_region() {
    let x = RegisterFile::new("X", 5, 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let cond = b.read_reg_file(&x, rs1);
    let mut inner = None;
    b.if_then(cond, |b| {
        let rd = b.field("rd", 5);
        inner = Some(b.write_reg_file(&x, rd, cond));
    });
    let rd = b.field("rd", 5);
    let outer = b.write_reg_file(&x, rd, cond);
    let graph = b.finish();

    let end = graph.instr_end().unwrap();
    let Node::InstrEnd { side_effects } = graph.node(end).unwrap() else {
        panic!("expected an instruction end");
    };
    assert_eq!(side_effects, &vec![outer]);
    let branch_effects: Vec<NodeId> = graph
        .iter()
        .filter_map(|(_, n)| match n {
            Node::BranchEnd { side_effects, .. } => Some(side_effects.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(branch_effects, vec![inner.unwrap()]);
}

#[test]
fn test_insert_and_unlink_keep_links_consistent() {
    let mut graph = GraphBuilder::new().finish();
    let start = graph.start().unwrap();
    let end = graph.instr_end().unwrap();

    let a = graph
        .insert_after(
            start,
            Node::Op {
                op: TcgOp::GenLabel(Label::new("a")),
                next: None,
            },
        )
        .unwrap();
    let b = graph
        .insert_before(
            end,
            Node::Op {
                op: TcgOp::SetLabel(Label::new("a")),
                next: None,
            },
        )
        .unwrap();
    assert_eq!(graph.next(start), Some(a));
    assert_eq!(graph.next(a), Some(b));
    assert_eq!(graph.pred(end), Some(b));

    graph.unlink(a).unwrap();
    assert_eq!(graph.next(start), Some(b));
    assert_eq!(graph.pred(b), Some(start));
    assert!(graph.get(a).is_none());
    assert!(graph.node(a).is_err());
}

#[test]
fn test_set_next_on_end_node_fails() {
    let mut graph = GraphBuilder::new().finish();
    let end = graph.instr_end().unwrap();
    let err = graph.set_next(end, None).unwrap_err();
    assert!(err.message.contains("has no successor"));
}

#[test]
fn test_users_and_bits() {
    let mut b = GraphBuilder::new();
    let a = b.field("a", 12);
    let wide = b.sign_extend(a, 64);
    let pair = b.builtin_typed(BuiltIn::AddS, &[wide, wide], Ty::Tuple(vec![64, 4]));
    let graph = b.finish();
    assert_eq!(graph.users(a), vec![wide]);
    assert_eq!(graph.users(wide), vec![pair]);
    assert_eq!(graph.bits(wide).unwrap(), 64);
    assert!(graph.bits(pair).is_err());
}

#[test]
fn test_sweep_removes_unreachable_data() {
    let x = RegisterFile::new("X", 5, 64);
    let mut b = GraphBuilder::new();
    let rs1 = b.field("rs1", 5);
    let read = b.read_reg_file(&x, rs1);
    let unused = b.constant(7, 64);
    let mut graph = b.finish();
    let before = graph.len();

    let removed = graph.sweep();
    assert_eq!(removed, 1);
    assert_eq!(graph.len(), before - 1);
    assert!(graph.get(unused).is_none());
    assert!(graph.get(read).is_some());
    assert!(graph.get(rs1).is_some());
}

#[test]
fn test_ty_display() {
    assert_eq!(Ty::Bits(16).to_string(), "Bits<16>");
    assert_eq!(Ty::Tuple(vec![64, 4]).to_string(), "(Bits<64>, Bits<4>)");
    assert_eq!(NodeId(7).to_string(), "n7");
}
