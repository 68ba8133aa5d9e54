use rustc_hash::FxHashMap;

use quill_bytecode::instruction::VarRef;
use quill_bytecode::module::BinaryModule;

use quill_ast::error::DecompileError;
use quill_ast::expr::{Expr, Instance, Var};
use quill_ast::label::LabelArena;
use quill_ast::node::{BasicBlock, FakeSwitch, Node, Raw, RawOp};
use quill_ast::LabelId;

/// Run the operand stack over every block, turning raw nodes into
/// expression and statement nodes.
///
/// Entry depths are propagated along branches first; a block entered with
/// depth `d` starts with `Incoming(0..d)` on its stack. Values still on the
/// stack at the end of a block become `Push` nodes ahead of its first branch.
pub fn simulate(
    blocks: Vec<BasicBlock>,
    module: &BinaryModule,
    labels: &LabelArena,
) -> Result<Vec<BasicBlock>, DecompileError> {
    let depths = entry_depths(&blocks, labels)?;
    let mut sim = Simulator::new(module);
    for (block, depth) in blocks.into_iter().zip(depths) {
        sim.block(block, depth)?;
    }
    sim.finish()
}

/// Operand stack depth at the entry of every block.
///
/// Blocks no branch reaches are entered with depth 0.
fn entry_depths(blocks: &[BasicBlock], labels: &LabelArena) -> Result<Vec<u16>, DecompileError> {
    let index: FxHashMap<LabelId, usize> = blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.entry_label().map(|l| (l, i)))
        .collect();
    let mut depths: Vec<Option<usize>> = vec![None; blocks.len()];
    let mut work = Vec::new();
    if !blocks.is_empty() {
        depths[0] = Some(0);
        work.push(0);
    }

    while let Some(i) = work.pop() {
        let mut depth = depths[i].unwrap_or(0);
        for node in &blocks[i].body {
            let targets = match node {
                Node::Raw(raw) => {
                    // stack errors are reported with context by the simulation proper
                    let Some((pops, pushes)) = raw.op.stack_effect() else {
                        break;
                    };
                    if depth < pops {
                        break;
                    }
                    depth -= pops;
                    let targets = node.branch_targets();
                    depth += pushes;
                    targets
                }
                Node::Goto(target) => vec![*target],
                _ => Vec::new(),
            };
            for target in targets {
                let Some(&j) = index.get(&target) else {
                    continue;
                };
                match depths[j] {
                    None => {
                        depths[j] = Some(depth);
                        work.push(j);
                    }
                    Some(expected) if expected != depth => {
                        return Err(DecompileError::InconsistentStack {
                            label: labels.name(target).to_string(),
                            expected,
                            found: depth,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(depths
        .into_iter()
        .map(|d| d.unwrap_or(0) as u16)
        .collect())
}

struct Simulator<'a> {
    module: &'a BinaryModule,
    stack: Vec<Expr>,
    /// Nodes of the block being simulated.
    out: Vec<Node>,
    done: Vec<BasicBlock>,
    /// Open `pushenv` scopes, in address order.
    env_depth: usize,
}

impl<'a> Simulator<'a> {
    fn new(module: &'a BinaryModule) -> Self {
        Self {
            module,
            stack: Vec::new(),
            out: Vec::new(),
            done: Vec::new(),
            env_depth: 0,
        }
    }

    fn block(&mut self, block: BasicBlock, depth: u16) -> Result<(), DecompileError> {
        self.stack = (0..depth).map(Expr::Incoming).collect();
        self.out = Vec::with_capacity(block.body.len());
        let last = block.body.len().saturating_sub(1);

        for (i, node) in block.body.into_iter().enumerate() {
            match node {
                Node::Raw(raw) => self.step(raw)?,
                other => {
                    if i == last {
                        self.flush();
                    }
                    self.out.push(other);
                }
            }
        }
        // a block ending in `ret` still has its leftovers pushed before the return
        if !self.stack.is_empty() {
            let tail = self.out.pop();
            self.flush();
            self.out.extend(tail);
        }

        self.done.push(BasicBlock {
            entry_depth: depth,
            body: std::mem::take(&mut self.out),
        });
        Ok(())
    }

    /// Leave the remaining stack values as `Push` nodes, bottom first.
    /// Branches flush before they are emitted, so a value carried into a
    /// block is pushed on every edge that reaches it.
    fn flush(&mut self) {
        for value in self.stack.drain(..) {
            self.out.push(Node::Push(value));
        }
    }

    fn finish(self) -> Result<Vec<BasicBlock>, DecompileError> {
        if self.env_depth > 0 {
            return Err(DecompileError::UnbalancedEnvironment {
                open: self.env_depth,
                partial: self.partial(),
            });
        }
        Ok(self.done)
    }

    /// Every statement built so far, blocks spliced in order.
    fn partial(&self) -> Vec<Node> {
        self.done
            .iter()
            .flat_map(|b| b.body.iter().cloned())
            .chain(self.out.iter().cloned())
            .collect()
    }

    fn pop(&mut self) -> Result<Expr, DecompileError> {
        self.stack
            .pop()
            .ok_or_else(|| DecompileError::Invariant("operand stack drained early".to_string()))
    }

    fn step(&mut self, raw: Raw) -> Result<(), DecompileError> {
        let Some((pops, _)) = raw.op.stack_effect() else {
            let extra = match raw.op {
                RawOp::Dup(extra) => extra,
                _ => 0,
            };
            return Err(DecompileError::DupArity {
                offset: raw.offset,
                extra,
                partial: self.partial(),
            });
        };
        if self.stack.len() < pops {
            return Err(DecompileError::StackUnderflow {
                offset: raw.offset,
                instruction: raw.op.to_string(),
                needed: pops,
                available: self.stack.len(),
                partial: self.partial(),
            });
        }
        tracing::trace!(offset = raw.offset, op = %raw.op, depth = self.stack.len(), "simulate");

        match raw.op {
            RawOp::Push(c) => self.stack.push(Expr::Constant(c)),
            RawOp::PushLocal(name) => self.stack.push(Expr::Var(Var::local(name))),
            RawOp::PushVar(var) => {
                let var = self.pop_var(&var)?;
                self.stack.push(Expr::Var(var));
            }
            RawOp::Pop { var, swapped } => {
                let value = if swapped { Some(self.pop()?) } else { None };
                let target = self.pop_var(&var)?;
                let value = match value {
                    Some(value) => value,
                    None => self.pop()?,
                };
                self.out.push(Node::Assign { target, value });
            }
            RawOp::PopLocal(name) => {
                let value = self.pop()?;
                self.out.push(Node::Assign {
                    target: Var::local(name),
                    value,
                });
            }
            RawOp::Dup(_) => {
                let top = self.stack.split_off(self.stack.len() - pops);
                self.stack.extend(top.iter().cloned());
                self.stack.extend(top);
            }
            RawOp::Binary(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Expr::binary(op, left, right));
            }
            RawOp::Unary(op) => {
                let operand = self.pop()?;
                self.stack.push(Expr::unary(op, operand));
            }
            RawOp::Call { name, .. } => {
                // arguments are pushed last-first, so the top of the stack is the first one
                let mut args = self.stack.split_off(self.stack.len() - pops);
                args.reverse();
                self.stack.push(Expr::Call { name, args });
            }
            RawOp::Popz => {
                let node = match self.pop()? {
                    Expr::Call { name, args } => Node::Call { name, args },
                    value => Node::Discard(value),
                };
                self.out.push(node);
            }
            RawOp::Ret => {
                let value = self.pop()?;
                self.out.push(Node::Return(value));
            }
            RawOp::Bt(target) => {
                let cond = self.pop()?;
                self.flush();
                self.out.push(Node::CondGoto { cond, target });
            }
            RawOp::Bf(target) => {
                let cond = self.pop()?.negate();
                self.flush();
                self.out.push(Node::CondGoto { cond, target });
            }
            RawOp::PushEnv(skip) => {
                let env = match self.pop()? {
                    // a static instance reads as its name: `with (other)`
                    Expr::Constant(c) => match c.as_integer() {
                        Some(id) => Expr::Var(Var::local(self.module.instance_name(id as i32))),
                        None => Expr::Constant(c),
                    },
                    env => env,
                };
                self.env_depth += 1;
                self.flush();
                self.out.push(Node::PushEnv { env, skip });
            }
            RawOp::PopEnv(back) => {
                if self.env_depth == 0 {
                    return Err(DecompileError::UnmatchedPopEnv {
                        offset: raw.offset,
                        partial: self.partial(),
                    });
                }
                self.env_depth -= 1;
                self.flush();
                self.out.push(Node::PopEnv { back });
            }
            RawOp::SwitchDispatch { cases, default } => {
                let value = self.pop()?;
                self.flush();
                self.out.push(Node::FakeSwitch(FakeSwitch {
                    value,
                    cases: cases
                        .into_iter()
                        .map(|(c, target)| (Expr::Constant(c), target))
                        .collect(),
                    default,
                }));
            }
        }
        Ok(())
    }

    /// Pop the index and instance a variable reference takes from the stack.
    fn pop_var(&mut self, var: &VarRef) -> Result<Var, DecompileError> {
        let index = if var.array {
            Some(Box::new(self.pop()?))
        } else {
            None
        };
        let instance = if var.instance == 0 {
            match self.pop()? {
                Expr::Constant(c) => match c.as_integer() {
                    Some(id) => Instance::Named(self.module.instance_name(id as i32)),
                    None => Instance::Dynamic(Box::new(Expr::Constant(c))),
                },
                other => Instance::Dynamic(Box::new(other)),
            }
        } else {
            Instance::Named(self.module.instance_name(var.instance as i32))
        };
        Ok(Var {
            name: var.name.clone(),
            instance,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::types::BinOp;
    use quill_ast::Constant;

    fn module() -> BinaryModule {
        BinaryModule::new(vec![], vec!["obj_player".into()])
    }

    fn var_ref(name: &str, instance: i16, array: bool) -> VarRef {
        VarRef {
            name: name.into(),
            instance,
            array,
        }
    }

    fn raw(op: RawOp) -> Node {
        Node::raw(0, op)
    }

    fn block(label: u32, nodes: Vec<Node>) -> BasicBlock {
        let mut body = vec![Node::Label(LabelId(label))];
        body.extend(nodes);
        BasicBlock {
            entry_depth: 0,
            body,
        }
    }

    fn arena(n: u32) -> LabelArena {
        let mut labels = LabelArena::new();
        for i in 0..n {
            labels.named(format!("L{}", i));
        }
        labels
    }

    #[test]
    fn test_assign_expression_tree() {
        // self.x = (global.a + 2) * 3
        let blocks = vec![block(
            0,
            vec![
                raw(RawOp::PushVar(var_ref("a", -5, false))),
                raw(RawOp::Push(Constant::Int(2))),
                raw(RawOp::Binary(BinOp::Add)),
                raw(RawOp::Push(Constant::Short(3))),
                raw(RawOp::Binary(BinOp::Mul)),
                raw(RawOp::Pop {
                    var: var_ref("x", -1, false),
                    swapped: false,
                }),
                Node::Exit,
            ],
        )];
        let out = simulate(blocks, &module(), &arena(1)).unwrap();
        let expected = Node::Assign {
            target: Var::named("self", "x"),
            value: Expr::binary(
                BinOp::Mul,
                Expr::binary(
                    BinOp::Add,
                    Expr::Var(Var::named("global", "a")),
                    Expr::int(2),
                ),
                Expr::Constant(Constant::Short(3)),
            ),
        };
        assert_eq!(out[0].body, vec![Node::Label(LabelId(0)), expected, Node::Exit]);
    }

    #[test]
    fn test_call_arguments_in_source_order() {
        let blocks = vec![block(
            0,
            vec![
                raw(RawOp::Push(Constant::Int(2))),
                raw(RawOp::Push(Constant::Int(1))),
                raw(RawOp::Call {
                    name: "f".into(),
                    argc: 2,
                }),
                raw(RawOp::Popz),
                Node::Exit,
            ],
        )];
        let out = simulate(blocks, &module(), &arena(1)).unwrap();
        assert_eq!(
            out[0].body[1],
            Node::Call {
                name: "f".into(),
                args: vec![Expr::int(1), Expr::int(2)],
            }
        );
    }

    #[test]
    fn test_stack_instance_and_array_index() {
        // obj_player.hp[i] = 5 with the instance pushed as a constant
        let blocks = vec![block(
            0,
            vec![
                raw(RawOp::Push(Constant::Int(5))),
                raw(RawOp::Push(Constant::Int(0))),
                raw(RawOp::PushVar(var_ref("i", -1, false))),
                raw(RawOp::Pop {
                    var: var_ref("hp", 0, true),
                    swapped: false,
                }),
                Node::Exit,
            ],
        )];
        let out = simulate(blocks, &module(), &arena(1)).unwrap();
        let Node::Assign { target, value } = &out[0].body[1] else {
            panic!("expected assignment");
        };
        assert_eq!(target.instance, Instance::Named("obj_player".into()));
        assert_eq!(target.index.as_deref(), Some(&Expr::Var(Var::named("self", "i"))));
        assert_eq!(value, &Expr::int(5));
    }

    #[test]
    fn test_compound_assign_through_dup_and_swapped_pop() {
        // self.a[3] += 1
        let blocks = vec![block(
            0,
            vec![
                raw(RawOp::Push(Constant::Int(-1))),
                raw(RawOp::Push(Constant::Int(3))),
                raw(RawOp::Dup(1)),
                raw(RawOp::PushVar(var_ref("a", 0, true))),
                raw(RawOp::Push(Constant::Int(1))),
                raw(RawOp::Binary(BinOp::Add)),
                raw(RawOp::Pop {
                    var: var_ref("a", 0, true),
                    swapped: true,
                }),
                Node::Exit,
            ],
        )];
        let out = simulate(blocks, &module(), &arena(1)).unwrap();
        let elem = Var {
            name: "a".into(),
            instance: Instance::Named("self".into()),
            index: Some(Box::new(Expr::int(3))),
        };
        assert_eq!(
            out[0].body,
            vec![
                Node::Label(LabelId(0)),
                Node::Assign {
                    target: elem.clone(),
                    value: Expr::binary(BinOp::Add, Expr::Var(elem), Expr::int(1)),
                },
                Node::Exit,
            ]
        );
    }

    #[test]
    fn test_underflow_carries_partial() {
        let blocks = vec![block(
            0,
            vec![
                raw(RawOp::Push(Constant::Int(1))),
                raw(RawOp::Pop {
                    var: var_ref("x", -1, false),
                    swapped: false,
                }),
                Node::raw(7, RawOp::Binary(BinOp::Add)),
                Node::Exit,
            ],
        )];
        let err = simulate(blocks, &module(), &arena(1)).unwrap_err();
        match &err {
            DecompileError::StackUnderflow {
                offset,
                needed,
                available,
                ..
            } => {
                assert_eq!((*offset, *needed, *available), (7, 2, 0));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.partial().map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_bad_dup_arity() {
        let blocks = vec![block(
            0,
            vec![raw(RawOp::Push(Constant::Int(1))), raw(RawOp::Dup(4)), Node::Exit],
        )];
        let err = simulate(blocks, &module(), &arena(1)).unwrap_err();
        assert!(matches!(err, DecompileError::DupArity { extra: 4, .. }));
    }

    #[test]
    fn test_unbalanced_environment() {
        let blocks = vec![
            block(
                0,
                vec![
                    raw(RawOp::Push(Constant::Int(-3))),
                    raw(RawOp::PushEnv(LabelId(2))),
                    Node::Goto(LabelId(1)),
                ],
            ),
            block(1, vec![Node::Goto(LabelId(2))]),
            block(2, vec![Node::Exit]),
        ];
        let err = simulate(blocks, &module(), &arena(3)).unwrap_err();
        assert!(matches!(
            err,
            DecompileError::UnbalancedEnvironment { open: 1, .. }
        ));
    }

    #[test]
    fn test_unmatched_popenv() {
        let blocks = vec![block(
            0,
            vec![Node::raw(3, RawOp::PopEnv(LabelId(0))), Node::Exit],
        )];
        let err = simulate(blocks, &module(), &arena(1)).unwrap_err();
        assert!(matches!(err, DecompileError::UnmatchedPopEnv { offset: 3, .. }));
    }

    #[test]
    fn test_values_carried_across_blocks() {
        // L0: push 1; push 2; bt L2; goto L1
        // L1: push "a"; goto L3    L2: push "b"; goto L3    L3: popz; popz ...
        let blocks = vec![
            block(
                0,
                vec![
                    raw(RawOp::Push(Constant::Int(1))),
                    raw(RawOp::Push(Constant::Int(2))),
                    raw(RawOp::Bt(LabelId(2))),
                    Node::Goto(LabelId(1)),
                ],
            ),
            block(1, vec![Node::Goto(LabelId(3))]),
            block(2, vec![Node::Goto(LabelId(3))]),
            block(
                3,
                vec![
                    raw(RawOp::Pop {
                        var: var_ref("x", -1, false),
                        swapped: false,
                    }),
                    Node::Exit,
                ],
            ),
        ];
        let out = simulate(blocks, &module(), &arena(4)).unwrap();
        assert_eq!(out[3].entry_depth, 1);
        assert_eq!(
            out[0].body,
            vec![
                Node::Label(LabelId(0)),
                Node::Push(Expr::int(1)),
                Node::CondGoto {
                    cond: Expr::int(2),
                    target: LabelId(2),
                },
                Node::Goto(LabelId(1)),
            ]
        );
        assert_eq!(out[1].body[1], Node::Push(Expr::Incoming(0)));
        assert_eq!(
            out[3].body[1],
            Node::Assign {
                target: Var::named("self", "x"),
                value: Expr::Incoming(0),
            }
        );
    }

    #[test]
    fn test_inconsistent_depth() {
        let blocks = vec![
            block(
                0,
                vec![
                    raw(RawOp::Push(Constant::Int(1))),
                    raw(RawOp::Push(Constant::Int(1))),
                    raw(RawOp::Bt(LabelId(1))),
                    Node::Goto(LabelId(1)),
                ],
            ),
            block(1, vec![Node::Exit]),
        ];
        // bt reaches L1 with depth 1, the fallthrough goto after the same depth
        assert!(simulate(blocks, &module(), &arena(2)).is_ok());

        let blocks = vec![
            block(
                0,
                vec![
                    raw(RawOp::Push(Constant::Int(1))),
                    raw(RawOp::Push(Constant::Int(1))),
                    raw(RawOp::Bt(LabelId(1))),
                    raw(RawOp::Popz),
                    Node::Goto(LabelId(1)),
                ],
            ),
            block(1, vec![Node::Exit]),
        ];
        let err = simulate(blocks, &module(), &arena(2)).unwrap_err();
        assert_eq!(err.to_string(), "inconsistent stack depth at L1: 1 vs 0");
    }
}
