//! Architecture-specific context switching.
//!
//! [`switch`] saves the outgoing thread's callee-saved registers and stack
//! pointer, loads the incoming thread's, and returns. From the perspective
//! of the thread being switched *back* into, that return is indistinguishable
//! from an ordinary return from its own earlier call to `switch` — a plain
//! stackful-coroutine register swap, with the program counter carried
//! implicitly as the return address already sitting on the target stack.
//!
//! Only x86-64 is supported; every other module in this crate is portable.

use std::arch::global_asm;

/// Saved execution context: just the stack pointer.
///
/// The program counter is not stored separately — it lives on the stack as
/// the return address `switch`'s `ret` consumes, the same trick every
/// stackful-coroutine switch in this style relies on. The signal mask is
/// not stored per-context either: there is exactly one OS thread and hence
/// exactly one process-wide signal mask, so "the mask saved in this
/// context" cannot actually vary per thread. `unmasked` exists purely so
/// that tests can assert that a freshly bootstrapped context never starts
/// with the preemption signal blocked — the real enforcement of that
/// invariant is structural, in [`crate::timer`] and [`crate::scheduler`].
#[repr(C)]
pub struct Context {
    rsp: u64,
    /// Documents spec §4.3's "saved signal mask must be empty" invariant.
    pub unmasked: bool,
}

impl Context {
    /// An empty context for a slot that has never held a running thread.
    pub const fn empty() -> Self {
        Context {
            rsp: 0,
            unmasked: true,
        }
    }

    /// Synthesizes a context that, when first switched into, begins
    /// executing `entry` on `stack`.
    ///
    /// # Safety
    ///
    /// `stack` must remain valid and exclusively owned by this context's
    /// thread for as long as the context may be switched into.
    pub unsafe fn bootstrap(stack: &mut [u8], entry: EntryFn) -> Self {
        let stack_top = stack.as_mut_ptr() as u64 + stack.len() as u64;
        // 16-byte align, then reserve our 7-word synthetic frame (6 saved
        // registers + the trampoline return address) below it. The saved
        // `rsp` itself lands at `base - 56` (8 mod 16, like any `rsp` just
        // after a `call`); once `switch`'s epilogue pops the 6 registers and
        // `ret`s, `rsp` reaches `base` — 16-aligned, exactly as if
        // `uthreads_trampoline` had just been `call`ed — so its own `call
        // uthreads_thread_start` is issued at a 16-aligned `rsp` per SysV.
        let base = stack_top & !0xF;
        assert!(
            base >= stack.as_ptr() as u64 + 64,
            "stack buffer too small to bootstrap a thread"
        );

        let frame = (base - 7 * 8) as *mut u64;
        unsafe {
            // Slots popped by `switch`, in pop order: r15, r14, r13, r12, rbx, rbp.
            frame.add(0).write(0); // r15
            frame.add(1).write(0); // r14
            frame.add(2).write(0); // r13
            frame.add(3).write(entry as usize as u64); // r12: entry fn, read by the trampoline
            frame.add(4).write(0); // rbx
            frame.add(5).write(0); // rbp
            frame.add(6).write(uthreads_trampoline as usize as u64); // return address
        }

        Context {
            rsp: frame as u64,
            unmasked: true,
        }
    }
}

/// A thread's entry point. Contractually must call [`crate::exit`] on its
/// own tid rather than returning.
pub type EntryFn = extern "C" fn();

extern "C" {
    /// Saves the outgoing context's callee-saved registers and stack
    /// pointer into `*from`, loads them from `*to`, and returns into the
    /// thread owning `to` (or, for a freshly bootstrapped context, into
    /// [`uthreads_trampoline`]).
    fn uthreads_switch_context(from: *mut u64, to: *const u64);

    fn uthreads_trampoline();
}

/// Switches execution from `from` to `to`. Does not return until some
/// later `switch` call targets `from` again.
pub fn switch(from: &mut Context, to: &Context) {
    unsafe { uthreads_switch_context(&mut from.rsp, &to.rsp) }
}

global_asm!(
    r#"
.text
.globl uthreads_switch_context
uthreads_switch_context:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi], rsp
    mov rsp, [rsi]
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret

.globl uthreads_trampoline
uthreads_trampoline:
    mov rdi, r12
    call uthreads_thread_start
    ud2
"#
);

/// Called by [`uthreads_trampoline`] with the entry function's address in
/// `entry`. Never returns: entry functions must call `exit` on themselves,
/// and if one breaks that contract we terminate the thread for it rather
/// than falling off the end of the trampoline into garbage.
#[no_mangle]
extern "C" fn uthreads_thread_start(entry: u64) -> ! {
    let entry: EntryFn = unsafe { std::mem::transmute(entry as usize) };
    entry();
    log::error!("thread entry function returned without calling exit; terminating thread");
    crate::exit_current_or_abort();
}
