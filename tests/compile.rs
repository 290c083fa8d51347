//! End-to-end checks: compile a source program and inspect the emitted
//! AArch64 body between the prologue and the epilogue.

fn compile(source: &str) -> String {
  ramcc::generate_assembly(source).expect("program should compile")
}

/// Body of the emitted assembly with `.loc` directives elided.
fn body(asm: &str) -> Vec<String> {
  let lines: Vec<&str> = asm.lines().collect();
  let start = lines
    .iter()
    .position(|line| *line == "sub sp, sp, 256")
    .expect("prologue should reserve the frame")
    + 1;
  let end = lines
    .iter()
    .rposition(|line| *line == "add sp, sp, 256")
    .expect("epilogue should release the frame");
  lines[start..end]
    .iter()
    .filter(|line| !line.starts_with(".loc "))
    .map(|line| line.to_string())
    .collect()
}

/// All label definition lines in the body, in emission order.
fn labels(asm: &str) -> Vec<String> {
  body(asm)
    .into_iter()
    .filter(|line| line.ends_with(':'))
    .collect()
}

#[test]
fn integer_literal_return() {
  let asm = compile("{ return 42; }");
  assert_eq!(body(&asm), vec!["movz x0, 42", "ret"]);
}

#[test]
fn arithmetic_with_precedence() {
  let asm = compile("{ return 1 + 2 * 3; }");
  assert_eq!(
    body(&asm),
    vec![
      "movz x0, 1",
      "str x0, [sp, -16]!",
      "movz x0, 2",
      "str x0, [sp, -16]!",
      "movz x0, 3",
      "ldr x1, [sp], 16",
      "mul x0, x1, x0",
      "ldr x1, [sp], 16",
      "add x0, x1, x0",
      "ret",
    ]
  );
}

#[test]
fn local_variable_round_trip() {
  let asm = compile("{ int a; a = 7; return a; }");
  assert_eq!(
    body(&asm),
    vec![
      "add x0, fp, 0",
      "str x0, [sp, -16]!",
      "movz x0, 7",
      "ldr x1, [sp], 16",
      "str x0, [x1]",
      "ldr x0, [fp, 0]",
      "ret",
    ]
  );
}

#[test]
fn if_else_mints_one_label_pair() {
  let asm = compile("{ if (1) return 2; else return 3; }");
  assert_eq!(labels(&asm), vec![".if1.else:", ".if1.end:"]);
  assert!(asm.contains("b.eq .if1.else\n"));
  assert!(asm.contains("b .if1.end\n"));
}

#[test]
fn empty_for_loops_unconditionally() {
  let asm = compile("{ int i; for (;;) { } }");
  assert_eq!(labels(&asm), vec![".loop1.cond:", ".loop1.end:"]);
  assert!(asm.contains("b .loop1.cond\n"));
  assert!(!asm.contains("b.eq"));
}

#[test]
fn while_loop_tests_its_condition() {
  let asm = compile("{ int i; while (i < 3) i = i + 1; }");
  assert!(asm.contains(".loop1.cond:\n"));
  assert!(asm.contains("b.eq .loop1.end\n"));
  assert!(asm.contains("b .loop1.cond\n"));
}

#[test]
fn address_of_does_not_scale() {
  let asm = compile("{ int a; return *(&a); }");
  assert_eq!(body(&asm), vec!["add x0, fp, 0", "ldr x0, [x0]", "ret"]);
}

#[test]
fn pointer_plus_integer_scales_by_pointee_size() {
  let asm = compile("{ int p; return &p + 1; }");
  assert_eq!(
    body(&asm),
    vec![
      "add x0, fp, 0",
      "str x0, [sp, -16]!",
      "movz x0, 1",
      "ldr x1, [sp], 16",
      "movz x2, 8",
      "madd x0, x0, x2, x1",
      "ret",
    ]
  );
}

#[test]
fn pointer_minus_integer_scales_by_pointee_size() {
  let asm = compile("{ int p; return &p - 1; }");
  assert_eq!(
    body(&asm),
    vec![
      "add x0, fp, 0",
      "str x0, [sp, -16]!",
      "movz x0, 1",
      "ldr x1, [sp], 16",
      "movz x2, 8",
      "msub x0, x0, x2, x1",
      "ret",
    ]
  );
}

#[test]
fn integer_plus_pointer_scales_the_pointer_side() {
  let asm = compile("{ int p; return 1 + &p; }");
  assert_eq!(
    body(&asm),
    vec![
      "movz x0, 1",
      "str x0, [sp, -16]!",
      "add x0, fp, 0",
      "ldr x1, [sp], 16",
      "movz x2, 8",
      "madd x0, x1, x2, x0",
      "ret",
    ]
  );
}

#[test]
fn pointer_difference_divides_back_to_elements() {
  let asm = compile("{ int p; int q; return &p - &q; }");
  assert_eq!(
    body(&asm),
    vec![
      "add x0, fp, 0",
      "str x0, [sp, -16]!",
      "add x0, fp, 8",
      "ldr x1, [sp], 16",
      "sub x0, x1, x0",
      "movz x2, 8",
      "udiv x0, x0, x2",
      "ret",
    ]
  );
}

#[test]
fn minted_labels_are_unique_across_a_compile() {
  let asm = compile(
    "{ if (1) { while (1) if (0) ; } else for (;;) if (1) ; if (0) ; }",
  );
  let defined = labels(&asm);
  let mut deduped = defined.clone();
  deduped.sort();
  deduped.dedup();
  assert_eq!(deduped.len(), defined.len(), "duplicate labels in {defined:?}");

  // four ifs and two loops, each minting its own counter value
  assert_eq!(defined.len(), 12);
  for label in [
    ".if1.else:",
    ".loop2.cond:",
    ".if3.else:",
    ".loop4.cond:",
    ".if5.else:",
    ".if6.else:",
  ] {
    assert!(defined.iter().any(|l| l == label), "missing {label}");
  }
}

#[test]
fn whitespace_only_changes_do_not_affect_the_body() {
  let dense = compile("{int a;a=1+2;if(a)return a;return 0;}");
  let spread = compile("{\n  int a;\n  a = 1 + 2;\n\tif (a)\r\n    return a;\n  return 0;\n}");
  assert_eq!(body(&dense), body(&spread));
}

#[test]
fn loc_directives_reference_token_positions() {
  let asm = compile("{\nreturn 42;\n}");
  assert!(asm.contains(".loc 1 2 8\n"));
  assert!(asm.contains(".loc 1 2 1\n"));
}

#[test]
fn diagnostics_carry_a_caret_marker() {
  let err = ramcc::generate_assembly("{ return 1 + ; }").expect_err("parse should fail");
  let rendered = err.to_string();
  assert!(rendered.contains('^'), "no caret in: {rendered}");
  assert!(rendered.starts_with("1:14:"), "unexpected header: {rendered}");
}
