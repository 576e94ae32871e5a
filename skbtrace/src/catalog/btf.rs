//! Kernel BTF access
//!
//! Walks every type id of a BTF blob and reduces each function to a
//! [`FunctionSignature`], keeping only what the catalog scan needs.

use std::path::Path;

use btf_rs::{Btf, BtfType, Type};
use log::debug;

use super::{FunctionSignature, ParamType};
use crate::domain::TracerError;

/// Pointer qualifiers are followed at most this deep before giving up
const MAX_TYPE_CHAIN: usize = 16;

/// Read every function prototype from a BTF file
///
/// # Errors
/// Returns [`TracerError::BtfUnavailable`] when the file cannot be parsed.
pub fn read_signatures(path: &Path) -> Result<Vec<FunctionSignature>, TracerError> {
    let btf = Btf::from_file(path).map_err(|e| TracerError::BtfUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut signatures = Vec::new();
    // Type ids are dense and start at 1 (0 is void); the first failing id is the end.
    let mut id = 1u32;
    while let Ok(ty) = btf.resolve_type_by_id(id) {
        id += 1;
        let Type::Func(func) = ty else {
            continue;
        };
        let Ok(name) = btf.resolve_name(&func) else {
            continue;
        };
        let Ok(Type::FuncProto(proto)) = btf.resolve_chained_type(&func) else {
            debug!("Function {name} has no prototype");
            continue;
        };
        let params = proto.parameters.iter().map(|param| classify_param(&btf, param)).collect();
        signatures.push(FunctionSignature { name, params });
    }

    debug!("Scanned {} BTF types, {} functions", id - 1, signatures.len());
    Ok(signatures)
}

fn classify_param<P: BtfType>(btf: &Btf, param: &P) -> ParamType {
    let Ok(Type::Ptr(ptr)) = btf.resolve_chained_type(param) else {
        return ParamType::Other;
    };

    let mut current = match btf.resolve_chained_type(&ptr) {
        Ok(ty) => ty,
        Err(_) => return ParamType::Other,
    };
    for _ in 0..MAX_TYPE_CHAIN {
        let next = match &current {
            Type::Const(t) => btf.resolve_chained_type(t),
            Type::Volatile(t) => btf.resolve_chained_type(t),
            Type::Typedef(t) => btf.resolve_chained_type(t),
            Type::Restrict(t) => btf.resolve_chained_type(t),
            Type::Struct(s) => {
                return match btf.resolve_name(s) {
                    Ok(name) => ParamType::StructPtr(name),
                    Err(_) => ParamType::Other,
                };
            }
            _ => return ParamType::Other,
        };
        current = match next {
            Ok(ty) => ty,
            Err(_) => return ParamType::Other,
        };
    }
    ParamType::Other
}
