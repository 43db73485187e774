//! The real interpreter: Tcl/Tk 8.6 through its C API.
//!
//! Host commands are registered with `Tcl_CreateObjCommand`; the boxed
//! [`CommandData`] is the command's client data and is freed by the delete
//! trampoline.  Numeric links point Tcl straight at the host `Cell`; text
//! links point it at a `char *` slot holding a `Tcl_Alloc`ed mirror buffer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use libc::{c_char, c_int, c_uint, c_void};

use super::{Backend, CommandProc, DeleteProc, LinkTarget};

// ── C API ─────────────────────────────────────────────────────────────────────

#[repr(C)]
struct TclInterp {
    _private: [u8; 0],
}

#[repr(C)]
struct TclObj {
    _private: [u8; 0],
}

type ClientData = *mut c_void;
type ObjCmdProc =
    unsafe extern "C" fn(ClientData, *mut TclInterp, c_int, *const *mut TclObj) -> c_int;
type CmdDeleteProc = unsafe extern "C" fn(ClientData);

const TCL_OK: c_int = 0;
const TCL_ERROR: c_int = 1;

const TCL_LINK_DOUBLE: c_int = 2;
const TCL_LINK_STRING: c_int = 4;
const TCL_LINK_WIDE_INT: c_int = 5;

#[link(name = "tcl8.6")]
extern "C" {
    fn Tcl_FindExecutable(argv0: *const c_char);
    fn Tcl_CreateInterp() -> *mut TclInterp;
    fn Tcl_DeleteInterp(interp: *mut TclInterp);
    fn Tcl_Init(interp: *mut TclInterp) -> c_int;
    fn Tcl_EvalEx(interp: *mut TclInterp, script: *const c_char, len: c_int, flags: c_int)
        -> c_int;
    fn Tcl_GetStringResult(interp: *mut TclInterp) -> *const c_char;
    fn Tcl_SetObjResult(interp: *mut TclInterp, obj: *mut TclObj);
    fn Tcl_NewStringObj(bytes: *const c_char, len: c_int) -> *mut TclObj;
    fn Tcl_GetString(obj: *mut TclObj) -> *const c_char;
    fn Tcl_CreateObjCommand(
        interp: *mut TclInterp,
        name: *const c_char,
        proc: ObjCmdProc,
        client_data: ClientData,
        delete: Option<CmdDeleteProc>,
    ) -> *mut c_void;
    fn Tcl_DeleteCommand(interp: *mut TclInterp, name: *const c_char) -> c_int;
    fn Tcl_LinkVar(interp: *mut TclInterp, name: *const c_char, addr: *mut c_char, ty: c_int)
        -> c_int;
    fn Tcl_UnlinkVar(interp: *mut TclInterp, name: *const c_char);
    fn Tcl_UpdateLinkedVar(interp: *mut TclInterp, name: *const c_char);
    fn Tcl_Alloc(size: c_uint) -> *mut c_char;
    fn Tcl_Free(ptr: *mut c_char);
}

#[link(name = "tk8.6")]
extern "C" {
    fn Tk_Init(interp: *mut TclInterp) -> c_int;
    fn Tk_MainLoop();
}

/// Let the library locate its script directories from `argv[0]`.
pub fn find_executable(argv0: &str) {
    if let Ok(c) = CString::new(argv0) {
        // SAFETY: `c` is a valid NUL-terminated string for the call.
        unsafe { Tcl_FindExecutable(c.as_ptr()) };
    }
}

fn cstring(s: &str) -> Result<CString, String> {
    CString::new(s).map_err(|_| format!("\"{}\" contains a NUL byte", s.escape_debug()))
}

// ── Commands ──────────────────────────────────────────────────────────────────

struct CommandData {
    proc: CommandProc,
    on_delete: Option<DeleteProc>,
}

unsafe extern "C" fn command_trampoline(
    cd: ClientData,
    interp: *mut TclInterp,
    objc: c_int,
    objv: *const *mut TclObj,
) -> c_int {
    // SAFETY: `cd` is the `CommandData` box created in `create_command`;
    // Tcl keeps it alive until the delete trampoline runs.
    let data = &*(cd as *const CommandData);
    let args: Vec<String> = (0..objc.max(0) as usize)
        .map(|i| CStr::from_ptr(Tcl_GetString(*objv.add(i))).to_string_lossy().into_owned())
        .collect();
    let proc = data.proc.clone();

    // A panic must not unwind into C.
    let (code, text) = match catch_unwind(AssertUnwindSafe(|| proc(&args))) {
        Ok(Ok(result)) => (TCL_OK, result),
        Ok(Err(message)) => (TCL_ERROR, message),
        Err(_) => (TCL_ERROR, "host command panicked".to_owned()),
    };
    set_obj_result(interp, &text);
    code
}

unsafe extern "C" fn delete_trampoline(cd: ClientData) {
    // SAFETY: called exactly once per command, after the last invocation.
    let data = Box::from_raw(cd as *mut CommandData);
    if let Some(on_delete) = data.on_delete {
        if catch_unwind(AssertUnwindSafe(on_delete)).is_err() {
            tracing::error!(target: "rtk::tcl", "command deleter panicked");
        }
    }
}

unsafe fn set_obj_result(interp: *mut TclInterp, text: &str) {
    let len = c_int::try_from(text.len()).unwrap_or(c_int::MAX);
    Tcl_SetObjResult(interp, Tcl_NewStringObj(text.as_ptr().cast(), len));
}

// ── Links ─────────────────────────────────────────────────────────────────────

enum LinkSlot {
    /// Kept only so the cell outlives the link.
    Int(#[allow(dead_code)] Rc<Cell<i64>>),
    Double(#[allow(dead_code)] Rc<Cell<f64>>),
    /// The `char *` Tcl reads and replaces; boxed so its address is stable.
    Text(Box<Cell<*mut c_char>>),
}

fn alloc_text(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    // SAFETY: the buffer is len + 1 bytes; we write len bytes and a NUL.
    unsafe {
        let buf = Tcl_Alloc((bytes.len() + 1) as c_uint);
        if buf.is_null() {
            return buf;
        }
        ptr::copy_nonoverlapping(bytes.as_ptr().cast(), buf, bytes.len());
        *buf.add(bytes.len()) = 0;
        buf
    }
}

// ── TclBackend ────────────────────────────────────────────────────────────────

pub struct TclBackend {
    interp: *mut TclInterp,
    links: RefCell<HashMap<String, LinkSlot>>,
}

impl TclBackend {
    /// Create an interpreter with Tcl and Tk initialised.
    pub fn new() -> Result<Self, String> {
        // SAFETY: plain constructor call.
        let interp = unsafe { Tcl_CreateInterp() };
        if interp.is_null() {
            return Err("cannot create a Tcl interpreter".to_owned());
        }
        let backend = Self { interp, links: RefCell::new(HashMap::new()) };
        // SAFETY: `interp` is live for the lifetime of `backend`.
        unsafe {
            if Tcl_Init(interp) != TCL_OK {
                return Err(backend.result());
            }
            if Tk_Init(interp) != TCL_OK {
                return Err(backend.result());
            }
        }
        tracing::debug!(target: "rtk::tcl", "Tcl/Tk initialised");
        Ok(backend)
    }
}

impl Backend for TclBackend {
    fn eval(&self, script: &str) -> Result<(), String> {
        let c = cstring(script)?;
        // SAFETY: `c` outlives the call; the interpreter is live.
        match unsafe { Tcl_EvalEx(self.interp, c.as_ptr(), -1, 0) } {
            TCL_OK => Ok(()),
            _ => Err(self.result()),
        }
    }

    fn result(&self) -> String {
        // SAFETY: Tcl always returns a valid NUL-terminated result string.
        unsafe { CStr::from_ptr(Tcl_GetStringResult(self.interp)) }
            .to_string_lossy()
            .into_owned()
    }

    fn set_result(&self, value: &str) {
        // SAFETY: the interpreter is live.
        unsafe { set_obj_result(self.interp, value) };
    }

    fn create_command(
        &self,
        name: &str,
        proc: CommandProc,
        on_delete: DeleteProc,
    ) -> Result<(), String> {
        let c = cstring(name)?;
        let data = Box::into_raw(Box::new(CommandData { proc, on_delete: Some(on_delete) }));
        // SAFETY: ownership of `data` passes to Tcl until delete_trampoline.
        let token = unsafe {
            Tcl_CreateObjCommand(
                self.interp,
                c.as_ptr(),
                command_trampoline,
                data.cast(),
                Some(delete_trampoline),
            )
        };
        if token.is_null() {
            // SAFETY: Tcl did not take ownership.
            drop(unsafe { Box::from_raw(data) });
            return Err(format!("cannot create command \"{name}\""));
        }
        Ok(())
    }

    fn delete_command(&self, name: &str) -> Result<(), String> {
        let c = cstring(name)?;
        // SAFETY: the interpreter is live.
        match unsafe { Tcl_DeleteCommand(self.interp, c.as_ptr()) } {
            0 => Ok(()),
            _ => Err(format!("can't delete \"{name}\": command doesn't exist")),
        }
    }

    fn link_var(&self, name: &str, target: LinkTarget) -> Result<(), String> {
        let c = cstring(name)?;
        let (slot, addr, ty) = match target {
            LinkTarget::Int(cell) => {
                let addr = cell.as_ptr().cast::<c_char>();
                (LinkSlot::Int(cell), addr, TCL_LINK_WIDE_INT)
            }
            LinkTarget::Double(cell) => {
                let addr = cell.as_ptr().cast::<c_char>();
                (LinkSlot::Double(cell), addr, TCL_LINK_DOUBLE)
            }
            LinkTarget::Text(initial) => {
                let holder = Box::new(Cell::new(alloc_text(&initial)));
                let addr = holder.as_ptr().cast::<c_char>();
                (LinkSlot::Text(holder), addr, TCL_LINK_STRING)
            }
        };
        // SAFETY: `addr` points into `slot`, which the map keeps alive (at
        // a stable heap address) until `unlink_var`.
        if unsafe { Tcl_LinkVar(self.interp, c.as_ptr(), addr, ty) } != TCL_OK {
            let message = self.result();
            if let LinkSlot::Text(holder) = slot {
                free_text(&holder);
            }
            return Err(message);
        }
        self.links.borrow_mut().insert(name.to_owned(), slot);
        Ok(())
    }

    fn unlink_var(&self, name: &str) {
        let Ok(c) = cstring(name) else { return };
        // SAFETY: the interpreter is live; unlinking an unlinked name is harmless.
        unsafe { Tcl_UnlinkVar(self.interp, c.as_ptr()) };
        let removed = self.links.borrow_mut().remove(name);
        if let Some(LinkSlot::Text(holder)) = removed {
            free_text(&holder);
        }
    }

    fn update_linked_var(&self, name: &str) {
        if let Ok(c) = cstring(name) {
            // SAFETY: the interpreter is live.
            unsafe { Tcl_UpdateLinkedVar(self.interp, c.as_ptr()) };
        }
    }

    fn set_text_buffer(&self, name: &str, text: &str) {
        let links = self.links.borrow();
        if let Some(LinkSlot::Text(holder)) = links.get(name) {
            free_text(holder);
            holder.set(alloc_text(text));
        }
    }

    fn text_buffer(&self, name: &str) -> Option<String> {
        let links = self.links.borrow();
        let Some(LinkSlot::Text(holder)) = links.get(name) else {
            return None;
        };
        let buf = holder.get();
        if buf.is_null() {
            return None;
        }
        // SAFETY: Tcl keeps a NUL-terminated string in the slot.
        Some(unsafe { CStr::from_ptr(buf) }.to_string_lossy().into_owned())
    }

    fn main_loop(&self) {
        // SAFETY: Tk was initialised in `new`.
        unsafe { Tk_MainLoop() };
    }
}

fn free_text(holder: &Cell<*mut c_char>) {
    let old = holder.replace(ptr::null_mut());
    if !old.is_null() {
        // SAFETY: every non-null buffer came from Tcl_Alloc.
        unsafe { Tcl_Free(old) };
    }
}

impl Drop for TclBackend {
    fn drop(&mut self) {
        let names: Vec<String> = self.links.get_mut().keys().cloned().collect();
        for name in names {
            self.unlink_var(&name);
        }
        // SAFETY: nothing uses the interpreter after this.
        unsafe { Tcl_DeleteInterp(self.interp) };
    }
}
