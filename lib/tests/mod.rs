use crate::cil::{
    ExceptionHandler, ExceptionHandlerKind, Instruction, Member, MethodBody, MethodRef, MethodSignature, OpCode,
    Operand, Token, TypeRef, TypeSig,
};
use crate::control_flow::{ControlFlowGraph, EdgeType, RegionChild, RegionTree};
use crate::data_flow::{DataFlowGraph, DependencyFlags};
use crate::executor::{Argument, Driver, NullTokenHook, RunOutcome};
use crate::value::{Integer32, Value};
use crate::RC;

fn exception() -> TypeRef {
    TypeRef::new(Token::new(0x0100_0001), "System", "Exception", false)
}

fn decrypt() -> MethodRef {
    MethodRef::new(
        Token::new(0x0600_0002),
        TypeRef::new(Token::new(0x0200_0002), "", "<Module>", false),
        "Decode",
        MethodSignature::static_method(
            vec![
                TypeSig::I4,
                TypeSig::String,
                TypeSig::ValueType(TypeRef::new(Token::new(0x0100_0002), "System", "RuntimeFieldHandle", true)),
            ],
            TypeSig::String,
        ),
        false,
    )
}

/*
 * IL_0000: nop                      try {
 * IL_0001: ldc.i4 0x1234
 * IL_0006: ldc.i4.7
 * IL_0007: xor
 * IL_0008: ldstr "k3y"
 * IL_000d: ldtoken <field>
 * IL_0012: call string Decode(int32, string, RuntimeFieldHandle)
 * IL_0017: stloc.0
 * IL_0018: leave.s IL_0020          }
 * IL_001a: pop                      catch (Exception) {
 * IL_001b: ldnull
 * IL_001c: stloc.0
 * IL_001d: leave.s IL_0020          }
 * IL_001f: nop
 * IL_0020: ldloc.0
 * IL_0021: ret
 */
fn string_decryptor() -> MethodBody {
    let field = crate::cil::FieldRef::new(
        Token::new(0x0400_0009),
        TypeRef::new(Token::new(0x0200_0002), "", "<Module>", false),
        "data",
        TypeSig::SzArray(Box::new(TypeSig::U1)),
        true,
    );
    MethodBody::new(
        vec![
            Instruction::simple(0x00, OpCode::Nop),
            Instruction::new(0x01, OpCode::Ldc_I4, Operand::Int32(0x1234)),
            Instruction::simple(0x06, OpCode::Ldc_I4_7),
            Instruction::simple(0x07, OpCode::Xor),
            Instruction::new(0x08, OpCode::Ldstr, Operand::String("k3y".to_string())),
            Instruction::new(0x0d, OpCode::Ldtoken, Operand::Member(Member::Field(field))),
            Instruction::new(0x12, OpCode::Call, Operand::Method(decrypt())),
            Instruction::simple(0x17, OpCode::Stloc_0),
            Instruction::new(0x18, OpCode::Leave_S, Operand::BranchTarget(0x20)),
            Instruction::simple(0x1a, OpCode::Pop),
            Instruction::simple(0x1b, OpCode::Ldnull),
            Instruction::simple(0x1c, OpCode::Stloc_0),
            Instruction::new(0x1d, OpCode::Leave_S, Operand::BranchTarget(0x20)),
            Instruction::simple(0x1f, OpCode::Nop),
            Instruction::simple(0x20, OpCode::Ldloc_0),
            Instruction::simple(0x21, OpCode::Ret),
        ],
        vec![ExceptionHandler::new(
            ExceptionHandlerKind::Catch(exception()),
            0x00,
            0x1a,
            0x1a,
            0x1f,
        )],
        vec![TypeSig::String],
        Vec::new(),
        TypeSig::String,
    )
}

#[test]
fn decryptor_arguments_inside_a_try_block() {
    let body = string_decryptor();

    let mut driver = Driver::default();
    driver.dispatcher_mut().add_hook(RC::new(NullTokenHook));
    assert_eq!(
        driver.arguments_at(&body, 0x12).unwrap(),
        vec![
            Argument::Int32(0x1233),
            Argument::String("k3y".to_string()),
            Argument::Null
        ]
    );

    // The slice holds the producers of the call's operands and nothing else.
    let graph = DataFlowGraph::from_method_body(&body).unwrap();
    assert_eq!(
        graph.ordered_dependencies(0x12, DependencyFlags::STACK).unwrap(),
        vec![0x01, 0x06, 0x07, 0x08, 0x0d, 0x12]
    );
}

#[test]
fn decryptor_regions() {
    let cfg = ControlFlowGraph::from_method_body(&string_decryptor()).unwrap();
    let regions = cfg.regions();

    let guarded = match regions.scope(regions.root()).unwrap().entry() {
        Some(RegionChild::Region(id)) => id,
        other => panic!("unexpected entry {:?}", other),
    };
    assert!(regions.region(guarded).unwrap().as_guarded().is_some());
    assert_eq!(regions.first_block(guarded).unwrap(), Some(0x00));
    assert_eq!(regions.last_block(guarded).unwrap(), Some(0x1a));

    assert_eq!(cfg.edge(0x00, 0x1a).unwrap().edge_type(), EdgeType::Abnormal);
    assert_eq!(cfg.edge(0x00, 0x20).unwrap().edge_type(), EdgeType::Unconditional);
    assert_eq!(cfg.edge(0x1a, 0x20).unwrap().edge_type(), EdgeType::Unconditional);
    assert!(cfg.predecessor_indices(0x1f).unwrap().is_empty());

    // The region tree survives a round trip through JSON.
    let json = serde_json::to_string(regions).unwrap();
    let tree: RegionTree = serde_json::from_str(&json).unwrap();
    assert_eq!(&tree, regions);
}

#[test]
fn identity_transform_is_isomorphic() {
    let cfg = ControlFlowGraph::from_method_body(&string_decryptor()).unwrap();
    let copy = cfg
        .transform(|instructions| Ok(instructions.to_vec()))
        .unwrap();

    assert_eq!(copy.nodes().len(), cfg.nodes().len());
    assert_eq!(copy.edges(), cfg.edges());
    assert_eq!(copy.edge_type_counts(), cfg.edge_type_counts());
    assert_eq!(
        copy.regions().nesting_depth(copy.regions().root()).unwrap(),
        cfg.regions().nesting_depth(cfg.regions().root()).unwrap()
    );

    let mnemonics = cfg
        .transform(|instructions| {
            Ok(instructions
                .iter()
                .map(|instruction| instruction.opcode().mnemonic().to_string())
                .collect())
        })
        .unwrap();
    assert_eq!(mnemonics.block(0x20).unwrap().instructions(), &["ldloc.0", "ret"]);

    let failed = cfg.transform::<String, _>(|_| Err("no".into()));
    assert!(failed.is_err());
}

/*
 *          0: ldarg.0
 *          1: brtrue.s 6
 *         /            \
 * 3: ldc.i4.0       6: ldc.i4.1
 * 4: br.s 7            |
 *         \            /
 *          7: ret
 */
fn diamond() -> MethodBody {
    MethodBody::new(
        vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::new(1, OpCode::Brtrue_S, Operand::BranchTarget(6)),
            Instruction::simple(3, OpCode::Ldc_I4_0),
            Instruction::new(4, OpCode::Br_S, Operand::BranchTarget(7)),
            Instruction::simple(6, OpCode::Ldc_I4_1),
            Instruction::simple(7, OpCode::Ret),
        ],
        Vec::new(),
        Vec::new(),
        vec![TypeSig::Boolean],
        TypeSig::I4,
    )
}

#[test]
fn diamond_has_two_producers_and_forks() {
    let body = diamond();
    let graph = DataFlowGraph::from_method_body(&body).unwrap();
    let producers = graph
        .node(7)
        .unwrap()
        .stack_dependencies()
        .get(0)
        .unwrap()
        .sources()
        .iter()
        .map(|source| source.node())
        .collect::<Vec<u32>>();
    assert_eq!(producers, vec![3, 6]);

    let driver = Driver::default();
    assert_eq!(
        driver.run(&body).unwrap(),
        RunOutcome::Forked {
            offset: 1,
            targets: vec![6, 3]
        }
    );

    let mut context = driver.context(&body);
    context.set_argument(0, Value::int32(1)).unwrap();
    assert_eq!(
        driver.run_with(&body, &mut context).unwrap(),
        RunOutcome::Returned(Some(Value::int32(1)))
    );
}

#[test]
fn unknown_pointer_reads_are_unknown() {
    let body = MethodBody::new(
        vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::simple(1, OpCode::Ldind_I4),
            Instruction::simple(2, OpCode::Ret),
        ],
        Vec::new(),
        Vec::new(),
        vec![TypeSig::Pointer(Box::new(TypeSig::I4))],
        TypeSig::I4,
    );

    let stack = Driver::default().stack_at(&body, 2).unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0].as_int32().unwrap().known_mask(), 0);
}

#[test]
fn partially_known_arithmetic_through_the_driver() {
    // (x | 0xff) & 0x0f is always 0x0f, whatever x is.
    let body = MethodBody::new(
        vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::new(1, OpCode::Ldc_I4, Operand::Int32(0xff)),
            Instruction::simple(6, OpCode::Or),
            Instruction::new(7, OpCode::Ldc_I4_S, Operand::Int8(0x0f)),
            Instruction::simple(9, OpCode::And),
            Instruction::simple(10, OpCode::Ret),
        ],
        Vec::new(),
        Vec::new(),
        vec![TypeSig::I4],
        TypeSig::I4,
    );

    let stack = Driver::default().stack_at(&body, 10).unwrap();
    assert_eq!(stack, vec![Value::Int32(Integer32::known(0x0f))]);
}
