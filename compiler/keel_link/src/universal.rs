//! Compilation-wide linkage configuration and its lowering to object-level
//! linkage, visibility and DLL storage.

use crate::{LinkageCategory, ObjectFormat, TargetError, TargetTriple};

/// Facts about the target and compilation mode that every linkage decision
/// may consult. Computed once per compilation; never mutated afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UniversalLinkageInfo {
    pub is_elf_object: bool,
    pub use_dll_storage: bool,
    /// The module is split across several code generation units.
    pub has_multiple_codegen_units: bool,
    pub is_whole_module: bool,
}

impl UniversalLinkageInfo {
    pub fn new(
        triple: &TargetTriple,
        has_multiple_codegen_units: bool,
        is_whole_module: bool,
    ) -> Result<Self, TargetError> {
        let format = triple.object_format()?;
        Ok(Self::from_flags(
            format == ObjectFormat::Elf,
            format == ObjectFormat::Coff && !triple.is_cygwin_or_mingw(),
            has_multiple_codegen_units,
            is_whole_module,
        ))
    }

    pub const fn from_flags(
        is_elf_object: bool,
        use_dll_storage: bool,
        has_multiple_codegen_units: bool,
        is_whole_module: bool,
    ) -> Self {
        UniversalLinkageInfo {
            is_elf_object,
            use_dll_storage,
            has_multiple_codegen_units,
            is_whole_module,
        }
    }

    /// Private declarations may be referenced from another codegen unit of
    /// the same module, so they cannot get internal object linkage.
    pub fn should_all_private_decls_be_visible_from_other_files(&self) -> bool {
        self.has_multiple_codegen_units
    }

    /// Several codegen units may emit the same private definition.
    pub fn need_linker_to_merge_duplicate_symbols(&self) -> bool {
        self.has_multiple_codegen_units
    }

    /// Declarations of private entities are treated as public external.
    pub fn force_public_decls(&self) -> bool {
        self.is_whole_module && self.has_multiple_codegen_units
    }
}

/// Object-level linkage of a symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectLinkage {
    External,
    ExternalWeak,
    /// Definition that is discarded in favour of another unit's copy.
    AvailableExternally,
    /// Mergeable definition; duplicates are folded by the linker.
    LinkOnceOdr,
    Internal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Default,
    Hidden,
    Protected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DllStorage {
    Default,
    Import,
    Export,
}

/// What the object emitter needs to declare or define a global.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IrLinkage {
    pub linkage: ObjectLinkage,
    pub visibility: Visibility,
    pub dll_storage: DllStorage,
}

impl IrLinkage {
    const fn new(linkage: ObjectLinkage, visibility: Visibility, dll_storage: DllStorage) -> Self {
        IrLinkage {
            linkage,
            visibility,
            dll_storage,
        }
    }
}

impl UniversalLinkageInfo {
    /// Lower a linkage category to object-level linkage.
    pub fn ir_linkage(
        &self,
        category: LinkageCategory,
        is_definition: bool,
        is_weak_imported: bool,
    ) -> IrLinkage {
        let public_definition_visibility = if self.is_elf_object {
            Visibility::Protected
        } else {
            Visibility::Default
        };
        let export = if self.use_dll_storage {
            DllStorage::Export
        } else {
            DllStorage::Default
        };
        let import = if self.use_dll_storage {
            DllStorage::Import
        } else {
            DllStorage::Default
        };

        match category {
            LinkageCategory::Public => IrLinkage::new(
                ObjectLinkage::External,
                public_definition_visibility,
                export,
            ),
            LinkageCategory::Shared => {
                if is_definition {
                    IrLinkage::new(ObjectLinkage::LinkOnceOdr, Visibility::Hidden, DllStorage::Default)
                } else {
                    IrLinkage::new(ObjectLinkage::External, Visibility::Hidden, DllStorage::Default)
                }
            }
            LinkageCategory::Hidden => {
                IrLinkage::new(ObjectLinkage::External, Visibility::Hidden, DllStorage::Default)
            }
            LinkageCategory::Private => {
                if self.force_public_decls() && !is_definition {
                    return self.ir_linkage(
                        LinkageCategory::PublicExternal,
                        is_definition,
                        is_weak_imported,
                    );
                }
                let linkage = if self.need_linker_to_merge_duplicate_symbols() {
                    ObjectLinkage::LinkOnceOdr
                } else {
                    ObjectLinkage::Internal
                };
                let visibility = if self.should_all_private_decls_be_visible_from_other_files() {
                    Visibility::Hidden
                } else {
                    Visibility::Default
                };
                IrLinkage::new(linkage, visibility, DllStorage::Default)
            }
            LinkageCategory::PublicExternal => {
                if is_definition {
                    IrLinkage::new(
                        ObjectLinkage::AvailableExternally,
                        Visibility::Default,
                        DllStorage::Default,
                    )
                } else {
                    let linkage = if is_weak_imported {
                        ObjectLinkage::ExternalWeak
                    } else {
                        ObjectLinkage::External
                    };
                    IrLinkage::new(linkage, Visibility::Default, import)
                }
            }
            LinkageCategory::HiddenExternal => {
                if is_definition {
                    IrLinkage::new(
                        ObjectLinkage::AvailableExternally,
                        Visibility::Hidden,
                        DllStorage::Default,
                    )
                } else {
                    IrLinkage::new(ObjectLinkage::External, Visibility::Hidden, import)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(triple: &str, multi: bool, wmo: bool) -> UniversalLinkageInfo {
        TargetTriple::parse(triple)
            .and_then(|t| UniversalLinkageInfo::new(&t, multi, wmo))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_flags_from_triple() {
        let linux = info("x86_64-unknown-linux-gnu", false, true);
        assert!(linux.is_elf_object);
        assert!(!linux.use_dll_storage);

        let msvc = info("x86_64-pc-windows-msvc", false, false);
        assert!(!msvc.is_elf_object);
        assert!(msvc.use_dll_storage);

        let mingw = info("x86_64-pc-windows-gnu", false, false);
        assert!(!mingw.use_dll_storage);
    }

    #[test]
    fn test_derived_queries() {
        let single = UniversalLinkageInfo::from_flags(true, false, false, true);
        assert!(!single.force_public_decls());
        assert!(!single.need_linker_to_merge_duplicate_symbols());

        let multi_wmo = UniversalLinkageInfo::from_flags(true, false, true, true);
        assert!(multi_wmo.force_public_decls());
        assert!(multi_wmo.should_all_private_decls_be_visible_from_other_files());

        let multi = UniversalLinkageInfo::from_flags(true, false, true, false);
        assert!(!multi.force_public_decls());
    }

    #[test]
    fn test_public_definition_is_protected_on_elf() {
        let elf = UniversalLinkageInfo::from_flags(true, false, false, false);
        let macho = UniversalLinkageInfo::from_flags(false, false, false, false);
        assert_eq!(
            elf.ir_linkage(LinkageCategory::Public, true, false).visibility,
            Visibility::Protected
        );
        assert_eq!(
            macho.ir_linkage(LinkageCategory::Public, true, false).visibility,
            Visibility::Default
        );
    }

    #[test]
    fn test_dll_storage_under_coff() {
        let coff = UniversalLinkageInfo::from_flags(false, true, false, false);
        assert_eq!(
            coff.ir_linkage(LinkageCategory::Public, true, false).dll_storage,
            DllStorage::Export
        );
        assert_eq!(
            coff.ir_linkage(LinkageCategory::PublicExternal, false, false),
            IrLinkage::new(ObjectLinkage::External, Visibility::Default, DllStorage::Import)
        );
    }

    #[test]
    fn test_shared_definition_is_link_once() {
        let info = UniversalLinkageInfo::from_flags(true, false, false, false);
        assert_eq!(
            info.ir_linkage(LinkageCategory::Shared, true, false),
            IrLinkage::new(ObjectLinkage::LinkOnceOdr, Visibility::Hidden, DllStorage::Default)
        );
        assert_eq!(
            info.ir_linkage(LinkageCategory::Shared, false, false).linkage,
            ObjectLinkage::External
        );
    }

    #[test]
    fn test_private_depends_on_codegen_units() {
        let single = UniversalLinkageInfo::from_flags(true, false, false, false);
        assert_eq!(
            single.ir_linkage(LinkageCategory::Private, true, false),
            IrLinkage::new(ObjectLinkage::Internal, Visibility::Default, DllStorage::Default)
        );

        let multi = UniversalLinkageInfo::from_flags(true, false, true, false);
        assert_eq!(
            multi.ir_linkage(LinkageCategory::Private, true, false),
            IrLinkage::new(ObjectLinkage::LinkOnceOdr, Visibility::Hidden, DllStorage::Default)
        );

        let multi_wmo = UniversalLinkageInfo::from_flags(true, false, true, true);
        assert_eq!(
            multi_wmo.ir_linkage(LinkageCategory::Private, false, false).linkage,
            ObjectLinkage::External
        );
    }

    #[test]
    fn test_external_definitions_are_available_externally() {
        let info = UniversalLinkageInfo::from_flags(true, false, false, false);
        assert_eq!(
            info.ir_linkage(LinkageCategory::HiddenExternal, true, false),
            IrLinkage::new(
                ObjectLinkage::AvailableExternally,
                Visibility::Hidden,
                DllStorage::Default
            )
        );
        assert_eq!(
            info.ir_linkage(LinkageCategory::PublicExternal, false, true).linkage,
            ObjectLinkage::ExternalWeak
        );
    }
}
