//! Canonical identity strings for types, methods and call sites.
//!
//! External configuration (work-set directives, the token override table) refers to types
//! and methods by strings that stay stable across recompilation. This module defines them:
//!
//! - **type id**: namespace-qualified name with the generic arity suffix kept, nested types
//!   separated from their declaring type by `+` (``Game.Inventory`1+Slot``)
//! - **method signature**: `Name<G0,G1>(P0,P1)`, each parameter rendered by [`type_name`],
//!   without spaces
//! - **call-site identity**: `"<type id> <method signature>"`, the main part hashed by
//!   [`crate::hotfix::TokenHasher`]
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::metadata::identity::{compose_type_id, type_name};
//! use dotpatch::metadata::signatures::TypeSignature;
//!
//! let outer = compose_type_id("Game", "Inventory`1", None);
//! assert_eq!(compose_type_id("", "Slot", Some(&outer)), "Game.Inventory`1+Slot");
//!
//! let array = TypeSignature::SzArray(Box::new(TypeSignature::I4));
//! assert_eq!(type_name(&array, &[], &[]), "System.Int32[]");
//! ```

use crate::metadata::{
    method::MethodDef,
    module::{MethodId, Module},
    signatures::TypeSignature,
};

/// Separator between a nested type and its declaring type.
pub const NESTED_SEPARATOR: char = '+';

/// Builds the canonical id of a type from its name parts.
#[must_use]
pub fn compose_type_id(namespace: &str, name: &str, declaring: Option<&str>) -> String {
    match declaring {
        Some(outer) => format!("{}{}{}", outer, NESTED_SEPARATOR, name),
        None if namespace.is_empty() => name.to_string(),
        None => format!("{}.{}", namespace, name),
    }
}

/// Normalizes a type id written with `/` as nesting separator.
#[must_use]
pub fn normalize_type_id(raw: &str) -> String {
    raw.replace('/', "+")
}

/// Renders a type the way it appears in method signatures.
///
/// Generic parameters render by name, taken from `type_params` (`!n`) and `method_params`
/// (`!!n`); parameters without a known name render positionally.
#[must_use]
pub fn type_name(
    signature: &TypeSignature,
    type_params: &[String],
    method_params: &[String],
) -> String {
    let mut out = String::new();
    write_type_name(&mut out, signature, type_params, method_params);
    out
}

fn write_type_name(
    out: &mut String,
    signature: &TypeSignature,
    type_params: &[String],
    method_params: &[String],
) {
    if let Some(name) = signature.primitive_name() {
        out.push_str(name);
        return;
    }
    match signature {
        TypeSignature::Class(reference) | TypeSignature::ValueType(reference) => {
            out.push_str(&reference.id);
        }
        TypeSignature::GenericInst(definition, args) => {
            write_type_name(out, definition, type_params, method_params);
            out.push('<');
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_type_name(out, arg, type_params, method_params);
            }
            out.push('>');
        }
        TypeSignature::GenericParamType(index) => match type_params.get(*index as usize) {
            Some(name) => out.push_str(name),
            None => out.push_str(&format!("!{}", index)),
        },
        TypeSignature::GenericParamMethod(index) => match method_params.get(*index as usize) {
            Some(name) => out.push_str(name),
            None => out.push_str(&format!("!!{}", index)),
        },
        TypeSignature::ByRef(inner) => {
            write_type_name(out, inner, type_params, method_params);
            out.push('&');
        }
        TypeSignature::Ptr(inner) => {
            write_type_name(out, inner, type_params, method_params);
            out.push('*');
        }
        TypeSignature::SzArray(inner) => {
            write_type_name(out, inner, type_params, method_params);
            out.push_str("[]");
        }
        TypeSignature::Array(inner, rank) => {
            write_type_name(out, inner, type_params, method_params);
            out.push('[');
            for _ in 1..*rank {
                out.push(',');
            }
            out.push(']');
        }
        _ => {}
    }
}

/// Renders the canonical signature of `method`, given its declaring type's generic
/// parameter names.
#[must_use]
pub fn method_signature(method: &MethodDef, type_params: &[String]) -> String {
    let mut out = method.name.clone();
    if !method.generic_params.is_empty() {
        out.push('<');
        out.push_str(&method.generic_params.join(","));
        out.push('>');
    }
    out.push('(');
    for (index, param) in method.params.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_type_name(
            &mut out,
            &param.param_type,
            type_params,
            &method.generic_params,
        );
    }
    out.push(')');
    out
}

/// The call-site identity of a method: type id and method signature separated by a space.
#[must_use]
pub fn call_site_identity(module: &Module, method: MethodId) -> Option<String> {
    let def = module.method(method)?;
    let owner = module.type_def(def.declaring_type)?;
    Some(format!(
        "{} {}",
        owner.id,
        method_signature(def, &owner.generic_params)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::{MethodAttributes, ParamDef},
        signatures::TypeRef,
    };

    #[test]
    fn type_names() {
        let list = TypeSignature::generic(
            TypeSignature::Class(TypeRef::external(
                "mscorlib",
                "System.Collections.Generic.List`1",
            )),
            vec![TypeSignature::GenericParamType(0)],
        );
        assert_eq!(
            type_name(&list, &["T".to_string()], &[]),
            "System.Collections.Generic.List`1<T>"
        );
        assert_eq!(
            type_name(&TypeSignature::Array(Box::new(TypeSignature::R4), 3), &[], &[]),
            "System.Single[,,]"
        );
        assert_eq!(
            type_name(&TypeSignature::by_ref(TypeSignature::GenericParamMethod(1)), &[], &[]),
            "!!1&"
        );
        assert_eq!(normalize_type_id("Game.Outer/Inner"), "Game.Outer+Inner");
    }

    #[test]
    fn method_signatures() {
        let mut method = MethodDef::new(
            "Swap",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            TypeSignature::Void,
            vec![
                ParamDef::by_ref("a", TypeSignature::GenericParamMethod(0)),
                ParamDef::new("b", TypeSignature::SzArray(Box::new(TypeSignature::String))),
                ParamDef::new("c", TypeSignature::GenericParamType(0)),
            ],
        );
        method.generic_params.push("U".to_string());
        assert_eq!(
            method_signature(&method, &["T".to_string()]),
            "Swap<U>(U&,System.String[],T)"
        );
    }
}
