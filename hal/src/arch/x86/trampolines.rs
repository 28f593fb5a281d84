//! # Interrupt and Context-Switch Leaves
//!
//! The assembly trampolines for vectors 0-47 and the context-switch
//! primitive. Each trampoline normalizes the stack (pushing a zero error
//! code where the CPU does not supply one), records the vector, saves the
//! register snapshot, and enters [`crate::interrupts::dispatch`].

use core::arch::global_asm;

use crate::cpu::TaskContext;
use crate::interrupts;

// Exceptions 8, 10-14, 17 push a hardware error code; every other vector
// gets a zero pushed by its stub so the frame layout is uniform.
global_asm!(
    r#"
    .macro isr_noerr n
    .global atlas_isr_\n
    atlas_isr_\n:
        push 0
        push \n
        jmp atlas_isr_common
    .endm

    .macro isr_err n
    .global atlas_isr_\n
    atlas_isr_\n:
        push \n
        jmp atlas_isr_common
    .endm

    isr_noerr 0
    isr_noerr 1
    isr_noerr 2
    isr_noerr 3
    isr_noerr 4
    isr_noerr 5
    isr_noerr 6
    isr_noerr 7
    isr_err   8
    isr_noerr 9
    isr_err   10
    isr_err   11
    isr_err   12
    isr_err   13
    isr_err   14
    isr_noerr 15
    isr_noerr 16
    isr_err   17
    isr_noerr 18
    isr_noerr 19
    isr_noerr 20
    isr_noerr 21
    isr_noerr 22
    isr_noerr 23
    isr_noerr 24
    isr_noerr 25
    isr_noerr 26
    isr_noerr 27
    isr_noerr 28
    isr_noerr 29
    isr_noerr 30
    isr_noerr 31
    isr_noerr 32
    isr_noerr 33
    isr_noerr 34
    isr_noerr 35
    isr_noerr 36
    isr_noerr 37
    isr_noerr 38
    isr_noerr 39
    isr_noerr 40
    isr_noerr 41
    isr_noerr 42
    isr_noerr 43
    isr_noerr 44
    isr_noerr 45
    isr_noerr 46
    isr_noerr 47

    atlas_isr_common:
        pusha
        mov eax, [esp + 32]       // vector pushed by the stub
        push eax
        call atlas_interrupt_entry
        add esp, 4
        popa
        add esp, 8                // drop vector + error code
        iretd

    .section .rodata
    .global ATLAS_ISR_TABLE
    .p2align 2
    ATLAS_ISR_TABLE:
    .irp n, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47
        .long atlas_isr_\n
    .endr
    .text
    "#
);

extern "C" {
    static ATLAS_ISR_TABLE: [u32; super::idt::STUB_VECTORS];
}

/// Addresses of the 48 vector trampolines, in vector order
pub fn stub_table() -> &'static [u32; super::idt::STUB_VECTORS] {
    unsafe { &ATLAS_ISR_TABLE }
}

/// Rust entry from the common trampoline
#[no_mangle]
extern "C" fn atlas_interrupt_entry(vector: u32) {
    interrupts::dispatch(vector);
}

// The switch leaf saves callee-saved registers, the stack pointer, a resume
// address, and flags into `prev`, then restores the same set from `next`.
// Field offsets match `TaskContext` (ebx esi edi ebp esp eip eflags).
global_asm!(
    r#"
    .global atlas_context_switch
    atlas_context_switch:
        mov eax, [esp + 4]        // prev
        mov edx, [esp + 8]        // next

        mov [eax + 0],  ebx
        mov [eax + 4],  esi
        mov [eax + 8],  edi
        mov [eax + 12], ebp
        mov [eax + 16], esp
        lea ecx, [2f]
        mov [eax + 20], ecx
        pushfd
        pop dword ptr [eax + 24]

        mov ebx, [edx + 0]
        mov esi, [edx + 4]
        mov edi, [edx + 8]
        mov ebp, [edx + 12]
        mov esp, [edx + 16]
        push dword ptr [edx + 24]
        popfd
        jmp dword ptr [edx + 20]
    2:
        ret
    "#
);

extern "C" {
    fn atlas_context_switch(prev: *mut TaskContext, next: *const TaskContext);
}

/// Swap execution contexts
///
/// # Safety
/// `next` must describe a resumable context (either captured by a previous
/// switch or built for a fresh task with a valid stack). Interrupts must be
/// disabled.
pub unsafe fn context_switch(prev: &mut TaskContext, next: &TaskContext) {
    unsafe {
        atlas_context_switch(prev as *mut TaskContext, next as *const TaskContext);
    }
}
