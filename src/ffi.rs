//! C ABI of the TensorFlow C API, as far as this crate uses it.
//!
//! Only types and function pointer signatures live here. The symbols are
//! resolved at run time by [`crate::executors::native`], so nothing in this
//! module links against `libtensorflow`.
#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void};

/// `void (*)(void* data, size_t length)`
pub type TF_Deallocator = unsafe extern "C" fn(data: *mut c_void, length: usize);

/// Length-prefixed byte region owned by whoever allocated the `TF_Buffer`.
#[repr(C)]
#[derive(Debug)]
pub struct TF_Buffer {
    pub data: *const c_void,
    pub length: usize,
    pub data_deallocator: Option<TF_Deallocator>,
}

impl TF_Buffer {
    pub const fn empty() -> Self {
        TF_Buffer {
            data: std::ptr::null(),
            length: 0,
            data_deallocator: None,
        }
    }
}

macro_rules! opaque {
    ($($name:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque!(
    TF_Status,
    TF_Graph,
    TF_Operation,
    TF_Session,
    TF_SessionOptions,
    TF_Tensor,
);

/// `TF_TString`: 24 bytes, 8-byte aligned small-string-optimized string.
#[repr(C, align(8))]
pub struct TF_TString {
    _data: [u8; 24],
}

pub const TF_TSTRING_SIZE: usize = std::mem::size_of::<TF_TString>();

/// One output slot of an operation.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TF_Output {
    pub oper: *mut TF_Operation,
    pub index: c_int,
}

pub type TF_Code = c_int;
pub type TF_DataType = c_int;

pub type TF_VersionFn = unsafe extern "C" fn() -> *const c_char;

pub type TF_NewBufferFn = unsafe extern "C" fn() -> *mut TF_Buffer;
pub type TF_DeleteBufferFn = unsafe extern "C" fn(*mut TF_Buffer);

pub type TF_NewStatusFn = unsafe extern "C" fn() -> *mut TF_Status;
pub type TF_DeleteStatusFn = unsafe extern "C" fn(*mut TF_Status);
pub type TF_GetCodeFn = unsafe extern "C" fn(*const TF_Status) -> TF_Code;
pub type TF_MessageFn = unsafe extern "C" fn(*const TF_Status) -> *const c_char;

pub type TF_NewSessionOptionsFn = unsafe extern "C" fn() -> *mut TF_SessionOptions;
pub type TF_DeleteSessionOptionsFn = unsafe extern "C" fn(*mut TF_SessionOptions);
pub type TF_SetTargetFn = unsafe extern "C" fn(*mut TF_SessionOptions, *const c_char);
pub type TF_SetConfigFn =
    unsafe extern "C" fn(*mut TF_SessionOptions, *const c_void, usize, *mut TF_Status);

pub type TF_NewGraphFn = unsafe extern "C" fn() -> *mut TF_Graph;
pub type TF_DeleteGraphFn = unsafe extern "C" fn(*mut TF_Graph);
pub type TF_GraphOperationByNameFn =
    unsafe extern "C" fn(*mut TF_Graph, *const c_char) -> *mut TF_Operation;
pub type TF_GraphNextOperationFn =
    unsafe extern "C" fn(*mut TF_Graph, *mut usize) -> *mut TF_Operation;
pub type TF_OperationNameFn = unsafe extern "C" fn(*mut TF_Operation) -> *const c_char;
pub type TF_OperationOpTypeFn = unsafe extern "C" fn(*mut TF_Operation) -> *const c_char;
pub type TF_OperationNumOutputsFn = unsafe extern "C" fn(*mut TF_Operation) -> c_int;

pub type TF_LoadSessionFromSavedModelFn = unsafe extern "C" fn(
    session_options: *const TF_SessionOptions,
    run_options: *const TF_Buffer,
    export_dir: *const c_char,
    tags: *const *const c_char,
    tags_len: c_int,
    graph: *mut TF_Graph,
    meta_graph_def: *mut TF_Buffer,
    status: *mut TF_Status,
) -> *mut TF_Session;
pub type TF_SessionRunFn = unsafe extern "C" fn(
    session: *mut TF_Session,
    run_options: *const TF_Buffer,
    inputs: *const TF_Output,
    input_values: *const *mut TF_Tensor,
    ninputs: c_int,
    outputs: *const TF_Output,
    output_values: *mut *mut TF_Tensor,
    noutputs: c_int,
    target_opers: *const *const TF_Operation,
    ntargets: c_int,
    run_metadata: *mut TF_Buffer,
    status: *mut TF_Status,
);
pub type TF_CloseSessionFn = unsafe extern "C" fn(*mut TF_Session, *mut TF_Status);
pub type TF_DeleteSessionFn = unsafe extern "C" fn(*mut TF_Session, *mut TF_Status);

pub type TF_AllocateTensorFn =
    unsafe extern "C" fn(TF_DataType, *const i64, c_int, usize) -> *mut TF_Tensor;
pub type TF_DeleteTensorFn = unsafe extern "C" fn(*mut TF_Tensor);
pub type TF_TensorTypeFn = unsafe extern "C" fn(*const TF_Tensor) -> TF_DataType;
pub type TF_NumDimsFn = unsafe extern "C" fn(*const TF_Tensor) -> c_int;
pub type TF_DimFn = unsafe extern "C" fn(*const TF_Tensor, c_int) -> i64;
pub type TF_TensorByteSizeFn = unsafe extern "C" fn(*const TF_Tensor) -> usize;
pub type TF_TensorDataFn = unsafe extern "C" fn(*const TF_Tensor) -> *mut c_void;

pub type TF_StringInitFn = unsafe extern "C" fn(*mut TF_TString);
pub type TF_StringCopyFn = unsafe extern "C" fn(*mut TF_TString, *const c_char, usize);
pub type TF_StringGetDataPointerFn = unsafe extern "C" fn(*const TF_TString) -> *const c_char;
pub type TF_StringGetSizeFn = unsafe extern "C" fn(*const TF_TString) -> usize;
pub type TF_StringDeallocFn = unsafe extern "C" fn(*mut TF_TString);
