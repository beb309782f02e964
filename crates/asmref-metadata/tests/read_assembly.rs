use asmref_identity::{AssemblyVersion, NEUTRAL_CULTURE};
use asmref_metadata::{
    public_key_token, AssemblyMetadata, EcmaMetadataReader, MetadataError, MetadataReader,
};
use asmref_test_utils::AssemblyBuilder;

#[test]
fn reads_identity_and_references() {
    let tmp = tempfile::tempdir().unwrap();
    let path = AssemblyBuilder::new("Contoso.Core")
        .version("1.2.3.4")
        .reference("mscorlib", "4.0.0.0")
        .strong_reference("System.Xml", "4.0.0.0", "b77a5c561934e089")
        .culture_reference("Contoso.Core.resources", "1.2.3.4", "fr-FR")
        .write_in(tmp.path(), "Contoso.Core.dll")
        .unwrap();

    let metadata = AssemblyMetadata::read(&path).unwrap();
    assert_eq!(metadata.identity.name, "Contoso.Core");
    assert_eq!(metadata.identity.version, Some(AssemblyVersion::new(1, 2, 3, 4)));
    assert_eq!(metadata.identity.culture.as_deref(), Some(NEUTRAL_CULTURE));
    assert_eq!(metadata.identity.public_key_token, None);
    assert_eq!(metadata.runtime_version, "v4.0.30319");

    let names: Vec<String> = metadata.references.iter().map(|r| r.full_name()).collect();
    assert_eq!(
        names,
        vec![
            "mscorlib, Version=4.0.0.0, Culture=neutral".to_string(),
            "System.Xml, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
                .to_string(),
            "Contoso.Core.resources, Version=1.2.3.4, Culture=fr-FR".to_string(),
        ]
    );
}

#[test]
fn full_public_keys_are_reduced_to_tokens() {
    let key: Vec<u8> = (0u8..160).collect();
    let expected = public_key_token(&key);

    let image = AssemblyBuilder::new("Signed")
        .version("2.0")
        .public_key(&key)
        .reference_with_full_key("Other", "1.0", &key)
        .build();

    let metadata = AssemblyMetadata::parse(&image).unwrap();
    assert_eq!(metadata.identity.public_key_token.as_ref(), Some(&expected));
    assert!(metadata.identity.is_strong_named());
    assert_eq!(
        metadata.references[0].public_key_token.as_ref(),
        Some(&expected)
    );
}

#[test]
fn non_pe_files_are_rejected() {
    let err = AssemblyMetadata::parse(b"definitely not an assembly").unwrap_err();
    assert!(matches!(err, MetadataError::NotPortableExecutable));

    let err = AssemblyMetadata::parse(b"MZ").unwrap_err();
    assert!(matches!(err, MetadataError::UnexpectedEof));
}

#[test]
fn truncated_images_fail_without_panicking() {
    let image = AssemblyBuilder::new("Short").version("1.0").build();
    for len in [0x40, 0x100, 0x210, 0x260] {
        assert!(AssemblyMetadata::parse(&image[..len]).is_err(), "len {len}");
    }
}

#[test]
fn oversized_row_counts_are_rejected() {
    let mut image = AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .reference("Zzz", "7.7.7.7")
        .build();

    // `#~` header: reserved, version 2.0, heap sizes, reserved, then the
    // valid mask for Module, Assembly and AssemblyRef.
    let valid: u64 = (1 << 0x00) | (1 << 0x20) | (1 << 0x23);
    let mut header = vec![0, 0, 0, 0, 2, 0, 0, 1];
    header.extend_from_slice(&valid.to_le_bytes());
    let start = image
        .windows(header.len())
        .position(|w| w == header.as_slice())
        .expect("tables header");
    // Row counts follow the 8-byte sorted mask: Module, Assembly, AssemblyRef.
    let assembly_ref_rows = start + header.len() + 8 + 8;
    image[assembly_ref_rows..assembly_ref_rows + 4].copy_from_slice(&u32::MAX.to_le_bytes());

    let err = AssemblyMetadata::parse(&image).unwrap_err();
    assert!(matches!(err, MetadataError::UnexpectedEof), "{err}");
}

#[test]
fn reader_trait_reads_identity() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("lib/Widget.dll");
    AssemblyBuilder::new("Widget")
        .version("3.1")
        .write_to(&path)
        .unwrap();

    let identity = EcmaMetadataReader.read_identity(&path).unwrap();
    assert_eq!(identity.full_name(), "Widget, Version=3.1.0.0, Culture=neutral");

    let missing = EcmaMetadataReader.read_identity(&tmp.path().join("nope.dll"));
    assert!(matches!(missing, Err(MetadataError::Io(_))));
}
