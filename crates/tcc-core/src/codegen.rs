//! NASM text emitter: a single pass over the syntax tree that accumulates
//! three section buffers (`.data`, `.bss`, `.text`) and assembles them into
//! the final assembly listing. Labels are resolved by NASM itself, so this
//! stage never needs a symbol table.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::ast::*;

/// Logically unreachable: the generator trusts that its input tree was
/// produced by the parser and is therefore well-formed. Kept so
/// `CompileError` has a symmetrical variant per pipeline stage.
#[allow(dead_code)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("internal: unhandled syntax tree node")]
    UnhandledNode,
}

const PRINT_INT_HELPER: &str = "\
print_int:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push r11
    mov rax, r15
    mov rbx, rax
    mov rcx, digit_buffer + 19
    mov r11, 10
    test rax, rax
    jge .pi_convert
    neg rax
.pi_convert:
    test rax, rax
    jnz .pi_loop
    dec rcx
    mov byte [rcx], '0'
    jmp .pi_sign
.pi_loop:
    test rax, rax
    jz .pi_sign
    xor rdx, rdx
    div r11
    add dl, '0'
    dec rcx
    mov [rcx], dl
    jmp .pi_loop
.pi_sign:
    test rbx, rbx
    jge .pi_write
    dec rcx
    mov byte [rcx], '-'
.pi_write:
    mov rdx, digit_buffer + 19
    sub rdx, rcx
    mov rsi, rcx
    mov rdi, 1
    mov rax, 1
    syscall
    mov rdx, 1
    mov rsi, newline
    mov rdi, 1
    mov rax, 1
    syscall
    pop r11
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
    ret";

const READ_INT_HELPER: &str = "\
read_int:
    push rax
    push rdi
    push rsi
    push rdx
    mov rax, 0
    mov rdi, 0
    mov rsi, input_buffer
    mov rdx, 32
    syscall
    mov r10, rax
    mov r11, input_buffer
    pop rdx
    pop rsi
    pop rdi
    pop rax
    xor r12, r12
    xor r13, r13
    xor r14, r14
    cmp r10, 0
    jle .ri_finish
    mov r15b, [r11]
    cmp r15b, '-'
    jne .ri_loop
    mov r14, 1
    inc r11
    mov r12, 1
.ri_loop:
    cmp r12, r10
    jge .ri_finish
    mov r15b, [r11]
    cmp r15b, '0'
    jl .ri_finish
    cmp r15b, '9'
    jg .ri_finish
    sub r15b, '0'
    movzx r15, r15b
    imul r13, r13, 10
    add r13, r15
    inc r11
    inc r12
    jmp .ri_loop
.ri_finish:
    mov r15, r13
    cmp r14, 0
    je .ri_return
    neg r15
.ri_return:
    ret";

struct Generator {
    data: Vec<String>,
    bss: Vec<String>,
    label_counter: u64,
    variables: HashSet<String>,
    function_queue: VecDeque<(String, Vec<Stmt>)>,
    needs_print_int: bool,
    needs_read_int: bool,
}

/// Maps the eight fixed TC registers onto their physical x86-64 names.
/// Anything outside `R1..R8` (a scratch name like `r10`) passes through
/// unchanged — the grammar never produces it as a `Register` operand, but
/// the helpers use the scratch range directly.
fn physical_reg(name: &str) -> String {
    match name {
        "R1" => "rax",
        "R2" => "rbx",
        "R3" => "rcx",
        "R4" => "rdx",
        "R5" => "rsi",
        "R6" => "rdi",
        "R7" => "r8",
        "R8" => "r9",
        other => other,
    }
    .to_string()
}

impl Generator {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            bss: Vec::new(),
            label_counter: 0,
            variables: HashSet::new(),
            function_queue: VecDeque::new(),
            needs_print_int: false,
            needs_read_int: false,
        }
    }

    fn next_label(&mut self) -> u64 {
        self.label_counter += 1;
        self.label_counter
    }

    fn operand_text(&self, op: &Operand) -> String {
        match op {
            Operand::Register(r) => physical_reg(r),
            Operand::Identifier(id) => format!("[{}]", id),
            Operand::Immediate(n) => n.to_string(),
        }
    }

    fn reg_or_imm_text(&self, op: &RegOrImm) -> String {
        match op {
            RegOrImm::Register(r) => physical_reg(r),
            RegOrImm::Immediate(n) => n.to_string(),
        }
    }

    fn lower_block(&mut self, buf: &mut Vec<String>, stmts: &[Stmt]) {
        for s in stmts {
            self.lower_stmt(buf, s);
        }
    }

    fn lower_stmt(&mut self, buf: &mut Vec<String>, s: &Stmt) {
        match s {
            Stmt::VarDecl(v) => self.lower_var_decl(v),
            Stmt::Load(l) => self.lower_load(buf, l),
            Stmt::Set(s) => self.lower_set(buf, s),
            Stmt::Move(m) => buf.push(format!(
                "    mov {}, {}",
                physical_reg(&m.dest),
                physical_reg(&m.src)
            )),
            Stmt::BinaryOp(b) => self.lower_binary_op(buf, b),
            Stmt::UnaryOp(u) => self.lower_unary_op(buf, u),
            Stmt::ShiftOp(sh) => self.lower_shift_op(buf, sh),
            Stmt::Function(f) => {
                self.function_queue.push_back((f.name.clone(), f.body.clone()));
            }
            Stmt::Call(c) => buf.push(format!("    call {}", c.name)),
            Stmt::Return(r) => {
                if let Some(reg) = &r.value {
                    buf.push(format!("    mov rax, {}", physical_reg(reg)));
                }
                buf.push("    ret".to_string());
            }
            Stmt::If(i) => self.lower_if(buf, i),
            Stmt::While(w) => self.lower_while(buf, w),
            Stmt::For(f) => self.lower_for(buf, f),
            Stmt::Loop(l) => self.lower_loop(buf, l),
            Stmt::Repeat(r) => self.lower_repeat(buf, r),
            Stmt::Push(p) => buf.push(format!("    push {}", physical_reg(&p.reg))),
            Stmt::Pop(p) => buf.push(format!("    pop {}", physical_reg(&p.reg))),
            Stmt::Print(p) => self.lower_print(buf, p),
            Stmt::Input(i) => self.lower_input(buf, i),
            Stmt::Halt => {
                buf.push("    mov rax, 60".to_string());
                buf.push("    mov rdi, 0".to_string());
                buf.push("    syscall".to_string());
            }
            Stmt::Nop => buf.push("    nop".to_string()),
            Stmt::Label(name) => buf.push(format!("{}:", name)),
        }
    }

    fn lower_var_decl(&mut self, v: &VarDecl) {
        self.variables.insert(v.name.clone());
        match v.init {
            Some(n) => self.data.push(format!("    {} dq {}", v.name, n)),
            None => self.bss.push(format!("    {} resq 1", v.name)),
        }
    }

    fn lower_load(&self, buf: &mut Vec<String>, l: &Load) {
        let dest = physical_reg(&l.dest);
        let src = self.operand_text(&l.src);
        buf.push(format!("    mov {}, {}", dest, src));
    }

    fn lower_set(&self, buf: &mut Vec<String>, s: &Set) {
        let src = self.reg_or_imm_text(&s.src);
        buf.push(format!("    mov qword [{}], {}", s.dest, src));
    }

    fn lower_binary_op(&self, buf: &mut Vec<String>, b: &BinaryOp) {
        let dest = physical_reg(&b.dest);
        let left = physical_reg(&b.left);

        if b.op == BinOp::Mul {
            // Two-operand `imul` only accepts a register/memory source; an
            // immediate needs the three-operand form.
            if dest != left {
                buf.push(format!("    mov {}, {}", dest, left));
            }
            match &b.right {
                RegOrImm::Register(r) => {
                    buf.push(format!("    imul {}, {}", dest, physical_reg(r)));
                }
                RegOrImm::Immediate(n) => {
                    buf.push(format!("    imul {}, {}, {}", dest, dest, n));
                }
            }
            return;
        }

        if b.op != BinOp::Div {
            if dest != left {
                buf.push(format!("    mov {}, {}", dest, left));
            }
            let mnemonic = match b.op {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::And => "and",
                BinOp::Or => "or",
                BinOp::Xor => "xor",
                BinOp::Mul | BinOp::Div => unreachable!("handled above"),
            };
            let right = self.reg_or_imm_text(&b.right);
            buf.push(format!("    {} {}, {}", mnemonic, dest, right));
            return;
        }

        let save_rdx = dest != "rdx";
        let save_rax = dest != "rax";
        if save_rdx {
            buf.push("    push rdx".to_string());
        }
        if save_rax {
            buf.push("    push rax".to_string());
        }
        if left != "rax" {
            buf.push(format!("    mov rax, {}", left));
        }
        buf.push("    xor rdx, rdx".to_string());
        match &b.right {
            RegOrImm::Immediate(n) => {
                buf.push(format!("    mov r10, {}", n));
                buf.push("    div r10".to_string());
            }
            RegOrImm::Register(r) => {
                buf.push(format!("    div {}", physical_reg(r)));
            }
        }
        if dest != "rax" {
            buf.push(format!("    mov {}, rax", dest));
        }
        if save_rax {
            buf.push("    pop rax".to_string());
        }
        if save_rdx {
            buf.push("    pop rdx".to_string());
        }
    }

    fn lower_unary_op(&self, buf: &mut Vec<String>, u: &UnaryOp) {
        let mnemonic = match u.op {
            UnOp::Inc => "inc",
            UnOp::Dec => "dec",
            UnOp::Not => "not",
        };
        match &u.operand {
            RegOrIdent::Register(r) => buf.push(format!("    {} {}", mnemonic, physical_reg(r))),
            RegOrIdent::Identifier(id) => {
                buf.push(format!("    {} qword [{}]", mnemonic, id));
            }
        }
    }

    fn lower_shift_op(&self, buf: &mut Vec<String>, sh: &ShiftOp) {
        let dest = physical_reg(&sh.dest);
        let src = physical_reg(&sh.src);
        if dest != src {
            buf.push(format!("    mov {}, {}", dest, src));
        }
        let mnemonic = match sh.op {
            ShiftKind::Shl => "shl",
            ShiftKind::Shr => "shr",
        };
        buf.push(format!("    {} {}, {}", mnemonic, dest, sh.count));
    }

    fn emit_condition(&self, buf: &mut Vec<String>, cond: &Condition, false_label: &str) {
        let left = self.operand_text(&cond.left);
        let right = self.operand_text(&cond.right);
        buf.push(format!("    mov r10, {}", left));
        buf.push(format!("    mov r11, {}", right));
        buf.push("    cmp r10, r11".to_string());
        let jump = match cond.op {
            CmpOp::Eq => "jne",
            CmpOp::Neq => "je",
            CmpOp::Gt => "jle",
            CmpOp::Lt => "jge",
            CmpOp::Gte => "jl",
            CmpOp::Lte => "jg",
        };
        buf.push(format!("    {} {}", jump, false_label));
    }

    fn lower_if(&mut self, buf: &mut Vec<String>, i: &If) {
        let n = self.next_label();
        let else_label = format!("else_{}", n);
        let endif_label = format!("endif_{}", n);
        self.emit_condition(buf, &i.cond, &else_label);
        self.lower_block(buf, &i.then_body);
        if let Some(else_body) = &i.else_body {
            buf.push(format!("    jmp {}", endif_label));
            buf.push(format!("{}:", else_label));
            self.lower_block(buf, else_body);
            buf.push(format!("{}:", endif_label));
        } else {
            buf.push(format!("{}:", else_label));
        }
    }

    fn lower_while(&mut self, buf: &mut Vec<String>, w: &While) {
        let n = self.next_label();
        let start = format!("while_start_{}", n);
        let end = format!("while_end_{}", n);
        buf.push(format!("{}:", start));
        self.emit_condition(buf, &w.cond, &end);
        self.lower_block(buf, &w.body);
        buf.push(format!("    jmp {}", start));
        buf.push(format!("{}:", end));
    }

    fn lower_repeat(&mut self, buf: &mut Vec<String>, r: &Repeat) {
        let n = self.next_label();
        let start = format!("repeat_start_{}", n);
        buf.push(format!("{}:", start));
        self.lower_block(buf, &r.body);
        // Jumping back to `start` when the condition is false implements
        // "repeat until true": the loop continues while UNTIL's condition
        // has not yet become true.
        self.emit_condition(buf, &r.cond, &start);
    }

    fn lower_loop(&mut self, buf: &mut Vec<String>, l: &Loop) {
        let n = self.next_label();
        let start = format!("loop_start_{}", n);
        let end = format!("loop_end_{}", n);
        buf.push(format!("    mov qword [{}], 0", l.var));
        buf.push(format!("{}:", start));
        buf.push(format!("    mov r10, [{}]", l.var));
        buf.push(format!("    mov r11, {}", l.limit));
        buf.push("    cmp r10, r11".to_string());
        buf.push(format!("    jge {}", end));
        self.lower_block(buf, &l.body);
        buf.push(format!("    inc qword [{}]", l.var));
        buf.push(format!("    jmp {}", start));
        buf.push(format!("{}:", end));
    }

    fn lower_for(&mut self, buf: &mut Vec<String>, f: &For) {
        let n = self.next_label();
        let start = format!("for_start_{}", n);
        let end = format!("for_end_{}", n);
        if !self.variables.contains(&f.var) {
            self.variables.insert(f.var.clone());
            self.bss.push(format!("    {} resq 1", f.var));
        }
        buf.push(format!("    mov qword [{}], {}", f.var, f.start));
        buf.push(format!("{}:", start));
        buf.push(format!("    mov r10, [{}]", f.var));
        buf.push(format!("    mov r11, {}", f.end));
        buf.push("    cmp r10, r11".to_string());
        buf.push(format!("    jg {}", end));
        self.lower_block(buf, &f.body);
        if f.step == 1 {
            buf.push(format!("    inc qword [{}]", f.var));
        } else {
            buf.push(format!("    add qword [{}], {}", f.var, f.step));
        }
        buf.push(format!("    jmp {}", start));
        buf.push(format!("{}:", end));
    }

    fn lower_print(&mut self, buf: &mut Vec<String>, p: &Print) {
        let value = self.operand_text(&p.value);
        buf.push(format!("    mov r15, {}", value));
        buf.push("    call print_int".to_string());
        self.needs_print_int = true;
    }

    fn lower_input(&mut self, buf: &mut Vec<String>, i: &Input) {
        buf.push("    call read_int".to_string());
        match &i.dest {
            RegOrIdent::Register(r) => buf.push(format!("    mov {}, r15", physical_reg(r))),
            RegOrIdent::Identifier(id) => buf.push(format!("    mov [{}], r15", id)),
        }
        self.needs_read_int = true;
    }
}

/// Lowers a parsed program into NASM x86-64 Linux assembly text.
pub fn generate(program: &Program) -> Result<String, GenError> {
    let mut gen = Generator::new();

    let mut main_buf = Vec::new();
    gen.lower_block(&mut main_buf, &program.statements);

    let mut func_buf = Vec::new();
    while let Some((name, body)) = gen.function_queue.pop_front() {
        func_buf.push(format!("{}:", name));
        gen.lower_block(&mut func_buf, &body);
    }

    if gen.needs_print_int {
        gen.data.push("    newline db 10".to_string());
        gen.data.push("    digit_buffer times 20 db 0".to_string());
    }
    if gen.needs_read_int {
        gen.data.push("    input_buffer times 32 db 0".to_string());
    }

    let mut out: Vec<String> = Vec::new();
    if !gen.data.is_empty() {
        out.push("section .data".to_string());
        out.extend(gen.data);
        out.push(String::new());
    }
    if !gen.bss.is_empty() {
        out.push("section .bss".to_string());
        out.extend(gen.bss);
        out.push(String::new());
    }
    out.push("section .text".to_string());
    out.push("global _start".to_string());
    out.push(String::new());
    out.push("_start:".to_string());
    out.push("    jmp main_code".to_string());
    out.push("main_code:".to_string());
    out.extend(main_buf);

    // Function bodies are textually placed after the main body (so a
    // disassembly reads main-code-first, functions-after, matching source
    // order of declaration relative to top-level statements) but must never
    // be reached by fallthrough: nothing calls them except an explicit
    // `call`, and `ret` inside one unwinds to whatever called it, not here.
    if !func_buf.is_empty() {
        out.push("    jmp program_exit".to_string());
        out.extend(func_buf);
        out.push("program_exit:".to_string());
    }
    out.push("    mov rax, 60".to_string());
    out.push("    mov rdi, 0".to_string());
    out.push("    syscall".to_string());

    if gen.needs_print_int {
        out.push(String::new());
        out.extend(PRINT_INT_HELPER.lines().map(str::to_string));
    }
    if gen.needs_read_int {
        out.push(String::new());
        out.extend(READ_INT_HELPER.lines().map(str::to_string));
    }

    out.push(String::new());
    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn compile(src: &str) -> String {
        let program = Parser::parse(tokenize(src)).expect("should parse");
        generate(&program).expect("should generate")
    }

    #[test]
    fn scenario_print_constant() {
        let asm = compile("VAR x, 7\nPRINT x\nHALT\n");
        assert!(asm.contains("x dq 7"));
        assert!(asm.contains("mov r15, [x]"));
        assert!(asm.contains("call print_int"));
        assert!(asm.contains("print_int:"));
        assert!(asm.contains("global _start"));
    }

    #[test]
    fn scenario_hex_and_binary_addition() {
        let asm = compile("LOAD R1, 0x1A\nLOAD R2, 0b1010\nADD R1, R1, R2\nPRINT R1\nHALT\n");
        assert!(asm.contains("mov rax, 26"));
        assert!(asm.contains("mov rbx, 10"));
        assert!(asm.contains("add rax, rbx"));
    }

    #[test]
    fn scenario_negative_input_round_trip() {
        let asm = compile("VAR n\nINPUT n\nPRINT n\nHALT\n");
        assert!(asm.contains("n resq 1"));
        assert!(asm.contains("call read_int"));
        assert!(asm.contains("mov [n], r15"));
        assert!(asm.contains("read_int:"));
    }

    #[test]
    fn if_else_inverts_condition_for_false_branch() {
        let asm = compile("IF R1 == 0\nHALT\nELSE\nNOP\nENDIF\n");
        assert!(asm.contains("jne else_1"));
        assert!(asm.contains("else_1:"));
        assert!(asm.contains("endif_1:"));
    }

    #[test]
    fn function_bodies_are_emitted_after_main_body_and_called() {
        let asm =
            compile("FUNC f\nLOAD R1, 99\nRET R1\nENDFUNC\nCALL f\nPRINT R1\nHALT\n");
        let jmp_pos = asm.find("jmp main_code").unwrap();
        let main_pos = asm.find("main_code:").unwrap();
        let call_pos = asm.find("call f").unwrap();
        let exit_jmp_pos = asm.find("jmp program_exit").unwrap();
        let func_pos = asm.rfind("f:").unwrap();
        let exit_label_pos = asm.find("program_exit:").unwrap();
        assert!(jmp_pos < main_pos);
        assert!(main_pos < call_pos);
        assert!(call_pos < exit_jmp_pos);
        assert!(exit_jmp_pos < func_pos);
        assert!(func_pos < exit_label_pos);
    }

    #[test]
    fn for_loop_counts_inclusive_range_with_default_step() {
        let asm = compile("FOR i FROM 1 TO 3\nPRINT i\nENDFOR\nHALT\n");
        assert!(asm.contains("i resq 1"));
        assert!(asm.contains("jg for_end_1"));
        assert!(asm.contains("inc qword [i]"));
    }

    #[test]
    fn div_protocol_preserves_destination_unless_it_is_rax() {
        let asm = compile("LOAD R2, 10\nLOAD R3, 3\nDIV R2, R2, R3\nPRINT R2\nHALT\n");
        assert!(asm.contains("push rax"));
        assert!(asm.contains("push rdx"));
        assert!(asm.contains("div rcx"));
        assert!(asm.contains("mov rbx, rax"));
    }

    #[test]
    fn helpers_are_only_emitted_when_needed() {
        let asm = compile("LOAD R1, 1\nHALT\n");
        assert!(!asm.contains("print_int:"));
        assert!(!asm.contains("read_int:"));
    }
}
