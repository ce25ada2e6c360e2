//! End-to-end checks: build a class, push it through bytes, and edit the
//! result

use classpatch::class::ClassFile;
use classpatch::code::{opcodes, Insn, InsnPtr, LookupSwitch, TableSwitch, ValueKind};
use classpatch::pool::PoolScan;
use classpatch::MethodAccessFlags;

/// A class with one static method counting down from its argument
fn countdown_class() -> ClassFile {
    let mut class = ClassFile::new("Countdown", "java/lang/Object").unwrap();
    let mut code = class.new_code();
    code.max_stack = 1;
    code.max_locals = 1;

    let loop_head = code.push(Insn::load_of(ValueKind::Int, 0));
    let exit = code.push(Insn::simple(opcodes::RETURN));
    let branch = code
        .insert_after(loop_head, Insn::jump(opcodes::IFLE, InsnPtr::Insn(exit)))
        .unwrap();
    let decrement = code.insert_after(branch, Insn::iinc(0, -1)).unwrap();
    code.insert_after(decrement, Insn::jump(opcodes::GOTO, InsnPtr::Insn(loop_head)))
        .unwrap();

    let method = class
        .add_method(
            "run",
            "(I)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
        .unwrap();
    method.code = Some(code);
    class
}

#[test]
fn serialize_parse_serialize_is_byte_exact() {
    let bytes = countdown_class().to_bytes().unwrap();
    let reread = ClassFile::parse(&bytes).unwrap();
    assert_eq!(reread.to_bytes().unwrap(), bytes);
}

#[test]
fn parsed_branches_are_instruction_mode() {
    let bytes = countdown_class().to_bytes().unwrap();
    let class = ClassFile::parse(&bytes).unwrap();
    let code = class.methods[0].code.as_ref().unwrap();

    for id in code.iter() {
        if let Some(target) = code.insn(id).unwrap().jump_target() {
            assert!(matches!(target, InsnPtr::Insn(_)));
        }
    }
}

#[test]
fn jump_targets_survive_insertions() {
    let bytes = countdown_class().to_bytes().unwrap();
    let mut class = ClassFile::parse(&bytes).unwrap();
    let code = class.methods[0].code.as_mut().unwrap();

    // The backward goto (second to last) points at the iload at byte 0
    let loop_head = code.first().unwrap();
    let goto = code.prev(code.last().unwrap()).unwrap();
    assert_eq!(
        code.insn(goto).unwrap().jump_target().unwrap().target(code).unwrap(),
        loop_head
    );

    // Pad the front with nops; the goto must follow the iload, not byte 0
    for _ in 0..4 {
        code.insert_before(loop_head, Insn::simple(opcodes::NOP)).unwrap();
    }
    assert_eq!(code.byte_index(loop_head).unwrap(), 4);
    assert_eq!(
        code.insn(goto).unwrap().jump_target().unwrap().target(code).unwrap(),
        loop_head
    );

    // And the re-encoded branch offsets reflect the shift
    let rewritten = class.to_bytes().unwrap();
    let reread = ClassFile::parse(&rewritten).unwrap();
    let code = reread.methods[0].code.as_ref().unwrap();
    let goto = code.prev(code.last().unwrap()).unwrap();
    let target = code.insn(goto).unwrap().jump_target().unwrap().target(code).unwrap();
    assert_eq!(code.byte_index(target).unwrap(), 4);
}

#[test]
fn switches_round_trip_with_padding() {
    let mut class = ClassFile::new("Switches", "java/lang/Object").unwrap();
    let mut code = class.new_code();
    code.max_stack = 1;
    code.max_locals = 1;

    let load = code.push(Insn::load_of(ValueKind::Int, 0));
    let case_a = code.push(Insn::simple(opcodes::RETURN));
    let case_b = code.push(Insn::simple(opcodes::RETURN));
    let fallback = code.push(Insn::simple(opcodes::RETURN));

    let table = Insn::TableSwitch(TableSwitch {
        low: 10,
        default_target: InsnPtr::Insn(fallback),
        targets: vec![InsnPtr::Insn(case_a), InsnPtr::Insn(case_b)],
    });
    code.insert_after(load, table).unwrap();

    let method = class
        .add_method(
            "pick",
            "(I)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
        .unwrap();
    method.code = Some(code);

    let bytes = class.to_bytes().unwrap();
    let reread = ClassFile::parse(&bytes).unwrap();
    assert_eq!(reread.to_bytes().unwrap(), bytes);

    let code = reread.methods[0].code.as_ref().unwrap();
    let switch_id = code.next(code.first().unwrap()).unwrap();
    match code.insn(switch_id).unwrap() {
        Insn::TableSwitch(switch) => {
            assert_eq!(switch.low, 10);
            assert_eq!(switch.high(), 11);
            assert_eq!(switch.targets.len(), 2);
        }
        other => panic!("expected a tableswitch, got {:?}", other),
    }
}

#[test]
fn lookup_switch_cases_sorted_on_write() {
    let mut class = ClassFile::new("Lookup", "java/lang/Object").unwrap();
    let mut code = class.new_code();
    code.max_stack = 1;
    code.max_locals = 1;

    let load = code.push(Insn::load_of(ValueKind::Int, 0));
    let out = code.push(Insn::simple(opcodes::RETURN));
    let switch = Insn::LookupSwitch(LookupSwitch {
        default_target: InsnPtr::Insn(out),
        // Deliberately unsorted
        cases: vec![(500, InsnPtr::Insn(out)), (-3, InsnPtr::Insn(out))],
    });
    code.insert_after(load, switch).unwrap();

    let method = class
        .add_method(
            "pick",
            "(I)V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        )
        .unwrap();
    method.code = Some(code);

    let bytes = class.to_bytes().unwrap();
    let reread = ClassFile::parse(&bytes).unwrap();
    let code = reread.methods[0].code.as_ref().unwrap();
    let switch_id = code.next(code.first().unwrap()).unwrap();
    match code.insn(switch_id).unwrap() {
        Insn::LookupSwitch(switch) => {
            let keys: Vec<i32> = switch.cases.iter().map(|(key, _)| *key).collect();
            assert_eq!(keys, vec![-3, 500]);
        }
        other => panic!("expected a lookupswitch, got {:?}", other),
    }
}

#[test]
fn pool_deduplication_is_idempotent_across_round_trips() {
    let class = countdown_class();
    let pool = class.pool();
    let before = pool.borrow().size();
    // Asking again for constants the class already uses adds nothing
    pool.borrow_mut().find_or_create_class("Countdown").unwrap();
    pool.borrow_mut().find_or_create_utf8("run").unwrap();
    assert_eq!(pool.borrow().size(), before);

    let bytes = class.to_bytes().unwrap();
    let reread = ClassFile::parse(&bytes).unwrap();
    let reread_pool = reread.pool();
    let size = reread_pool.borrow().size();
    reread_pool.borrow_mut().find_or_create_utf8("run").unwrap();
    assert_eq!(reread_pool.borrow().size(), size);
}

#[test]
fn scanner_agrees_with_the_parser() {
    let bytes = countdown_class().to_bytes().unwrap();
    let class = ClassFile::parse(&bytes).unwrap();
    let scan = PoolScan::new(&bytes).unwrap();

    assert_eq!(scan.size(), class.pool().borrow().size());
    // this_class sits right after the pool and the access flags
    let this_class = scan.read_u16(scan.end() + 2).unwrap();
    assert_eq!(this_class, class.this_class);
    let name_index = scan.read_u16(scan.data_offset(this_class).unwrap()).unwrap();
    assert_eq!(scan.utf8(name_index).unwrap(), "Countdown");
}

#[test]
fn removing_a_target_requires_redirect_before_writing() {
    let bytes = countdown_class().to_bytes().unwrap();
    let mut class = ClassFile::parse(&bytes).unwrap();
    let code = class.methods[0].code.as_mut().unwrap();

    let loop_head = code.first().unwrap();
    let replacement = code
        .insert_after(loop_head, Insn::load_of(ValueKind::Int, 0))
        .unwrap();
    code.remove(loop_head).unwrap();

    // The backward goto still points at the removed iload
    assert!(class.to_bytes().is_err());

    let code = class.methods[0].code.as_mut().unwrap();
    code.replace_target(loop_head, replacement);
    assert!(class.to_bytes().is_ok());
}
