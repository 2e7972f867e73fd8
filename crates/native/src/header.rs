//! C header generation.
//!
//! Renders the structs and entry points of a [`Manifest`] as a header that a
//! native backend can be compiled against. Each struct also gets one lookup
//! function per field type, `get_<type>_<struct>(x, name)`, returning the
//! field with that name or a sentinel (`-9999`, `NAN`, `false` or `NULL`).

use std::fmt::Write;

use econ_model_core::NamespaceSchema;

use crate::{CType, HeaderError, Manifest, ReturnType, StructLayout};

const PREAMBLE: &str = "\
#pragma once

#include <math.h>
#include <stdbool.h>
#include <stdint.h>
#include <string.h>

#ifdef __cplusplus
#define EXPORT_C extern \"C\"
#else
#define EXPORT_C
#endif

#if defined(_WIN32)
#define EXPORT EXPORT_C __declspec(dllexport)
#else
#define EXPORT EXPORT_C __attribute__((visibility(\"default\")))
#endif
";

/// Renders the header for `manifest`.
///
/// # Errors
///
/// Returns a [`HeaderError`] if a declared field has no C type or an entry
/// point takes a namespace without a declared struct.
pub fn render(manifest: &Manifest) -> Result<String, HeaderError> {
    let mut out = String::from("// Generated by econ-model-native. Do not edit.\n");
    out.push_str(PREAMBLE);

    for decl in &manifest.structs {
        let schema = NamespaceSchema {
            fields: decl.fields.clone(),
        };
        let layout = StructLayout::from_schema(&decl.namespace, decl.struct_name(), &schema)?;
        render_struct(&mut out, &layout);
        render_getters(&mut out, &layout);
    }

    for entry in &manifest.entry_points {
        let args = entry
            .args
            .iter()
            .map(|ns| {
                manifest
                    .struct_decl(ns)
                    .map(|decl| format!("{}* {ns}", decl.struct_name()))
                    .ok_or_else(|| HeaderError::UndeclaredNamespace {
                        entry: entry.name.clone(),
                        namespace: ns.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let args = if args.is_empty() {
            "void".to_owned()
        } else {
            args.join(", ")
        };
        let _ = writeln!(out, "\nEXPORT {} {}({args});", c_return(entry.returns), entry.name);
    }

    Ok(out)
}

fn render_struct(out: &mut String, layout: &StructLayout) {
    let _ = writeln!(out, "\ntypedef struct {}\n{{", layout.name);
    for field in &layout.fields {
        let _ = writeln!(out, " {} {};", field.ctype, field.name);
    }
    let _ = writeln!(out, "}} {};", layout.name);
}

fn render_getters(out: &mut String, layout: &StructLayout) {
    let mut ctypes: Vec<CType> = Vec::new();
    for field in &layout.fields {
        if !ctypes.contains(&field.ctype) {
            ctypes.push(field.ctype);
        }
    }

    for ctype in ctypes {
        let suffix = ctype.c_name().replace('*', "_p");
        let _ = writeln!(
            out,
            "\nstatic inline {ctype} get_{suffix}_{name}({name}* x, const char* name)\n{{",
            name = layout.name
        );
        for field in layout.fields.iter().filter(|f| f.ctype == ctype) {
            let _ = writeln!(
                out,
                " if (strcmp(name, \"{0}\") == 0) {{ return x->{0}; }}",
                field.name
            );
        }
        let _ = writeln!(out, " return {};\n}}", sentinel(ctype));
    }
}

fn sentinel(ctype: CType) -> &'static str {
    match ctype {
        CType::Double => "NAN",
        CType::Int64 => "-9999",
        CType::Bool => "false",
        CType::CharPtr | CType::DoublePtr | CType::Int64Ptr | CType::BoolPtr => "NULL",
    }
}

fn c_return(returns: ReturnType) -> &'static str {
    match returns {
        ReturnType::Void => "void",
        ReturnType::Double => "double",
        ReturnType::Int64 => "int64_t",
        ReturnType::Bool => "bool",
    }
}

#[cfg(test)]
mod tests {
    use econ_model_core::{FieldSpec, FieldType, ValueKind};

    use super::*;
    use crate::StructDecl;

    fn manifest() -> Manifest {
        Manifest {
            structs: vec![StructDecl {
                namespace: "par".into(),
                struct_name: None,
                fields: vec![
                    FieldSpec::new("beta", FieldType::scalar(ValueKind::Float)),
                    FieldSpec::new("Na", FieldType::scalar(ValueKind::Int)),
                    FieldSpec::new("grid_a", FieldType::array(ValueKind::FloatArray, 1)),
                ],
                size: None,
            }],
            entry_points: Vec::new(),
        }
        .with_entry_point("solve", ["par"], ReturnType::Void)
        .with_entry_point("version", Vec::<String>::new(), ReturnType::Int64)
    }

    #[test]
    fn renders_structs_in_field_order() {
        let header = render(&manifest()).unwrap();

        assert!(header.contains(
            "typedef struct par_struct\n{\n double beta;\n int64_t Na;\n double* grid_a;\n} par_struct;"
        ));
    }

    #[test]
    fn renders_getters_per_type() {
        let header = render(&manifest()).unwrap();

        assert!(header.contains(
            "static inline double get_double_par_struct(par_struct* x, const char* name)"
        ));
        assert!(header.contains(" if (strcmp(name, \"grid_a\") == 0) { return x->grid_a; }"));
        assert!(header.contains("get_double_p_par_struct"));
        assert!(header.contains(" return -9999;\n}"));
    }

    #[test]
    fn renders_prototypes() {
        let header = render(&manifest()).unwrap();

        assert!(header.contains("EXPORT void solve(par_struct* par);"));
        assert!(header.contains("EXPORT int64_t version(void);"));
    }

    #[test]
    fn prototypes_need_declared_structs() {
        let manifest = manifest().with_entry_point("simulate", ["par", "sim"], ReturnType::Void);

        assert_eq!(
            render(&manifest),
            Err(HeaderError::UndeclaredNamespace {
                entry: "simulate".into(),
                namespace: "sim".into(),
            })
        );
    }

    #[test]
    fn lists_cannot_be_rendered() {
        let mut manifest = manifest();
        manifest.structs[0]
            .fields
            .push(FieldSpec::new("draws", FieldType::scalar(ValueKind::List)));

        let Err(HeaderError::UnsupportedField(err)) = render(&manifest) else {
            panic!("expected an unsupported field");
        };
        assert_eq!(err.attribute, "draws");
    }
}
