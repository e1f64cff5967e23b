//! Canonical noise-name lists -- single source of truth for auxiliary
//! function classification.
//!
//! Both the eligibility classifier and the diagnostics noise tagging
//! consume these sets so the two can never diverge.

/// Version stamp for the name lists, echoed in reports on request.
pub const NOISE_LIST_VERSION: &str = "1.1";

/// Init / fini auxiliary symbol names.
pub const AUX_INIT_FINI_NAMES: &[&str] =
    &["_init", "_fini", "_DT_INIT", "_DT_FINI", "_INIT_0", "_FINI_0"];

/// Compiler / linker inserted symbol names.
///
/// Version-suffixed variants (e.g. `__cxa_finalize@@GLIBC_2.17`) are
/// handled by [`normalize_versioned_name`] before set lookup.
pub const COMPILER_AUX_NAMES: &[&str] = &[
    "frame_dummy",
    "register_tm_clones",
    "deregister_tm_clones",
    "__do_global_dtors_aux",
    "__libc_csu_init",
    "__libc_csu_fini",
    "__cxa_finalize",
    "__cxa_atexit",
    "__stack_chk_fail",
    "__gmon_start__",
    "_start",
    "__libc_start_main",
    "_dl_relocate_static_pie",
    "__x86.get_pc_thunk.bx",
    "__x86.get_pc_thunk.ax",
    "_ITM_registerTMCloneTable",
    "_ITM_deregisterTMCloneTable",
];

/// All auxiliary names, owned, for use as a profile default.
pub fn all_aux_names() -> Vec<String> {
    AUX_INIT_FINI_NAMES
        .iter()
        .chain(COMPILER_AUX_NAMES.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Strip `@@GLIBC_*` version suffixes for set membership tests.
///
/// `__cxa_finalize@@GLIBC_2.17` -> `__cxa_finalize`
pub fn normalize_versioned_name(name: &str) -> &str {
    match name.find("@@GLIBC_") {
        Some(idx) => &name[..idx],
        None => name,
    }
}
