// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Integration tests for the dynamic types module: exercises the builder,
//! value tree, and CDR codec together rather than one file's internals in
//! isolation.

use super::*;
use crate::dynamic::annotation::AnnotationDescriptor;
use crate::dynamic::builder::MemberDescriptor;

#[test]
fn full_workflow_build_set_serialize_deserialize() {
    let factory = DynamicTypeBuilderFactory::new();
    let u32t = factory.create_primitive(TypeKind::Uint32);
    let f64t = factory.create_primitive(TypeKind::Float64);
    let string_t = factory.create_string_type(0);

    let mut builder = factory.create_structure_builder("SensorReading");
    let id_id = builder.add_member(MemberDescriptor::new("sensor_id", u32t)).unwrap();
    let temp_id = builder.add_member(MemberDescriptor::new("temperature", f64t)).unwrap();
    let loc_id = builder.add_member(MemberDescriptor::new("location", string_t)).unwrap();
    let reading_type = builder.build().unwrap();
    assert!(reading_type.is_consistent());

    let mut data = DynamicData::create(reading_type.clone());
    data.set_uint32_value(id_id, 42).unwrap();
    data.set_float64_value(temp_id, 23.5).unwrap();
    data.set_string_value(loc_id, "Building A").unwrap();

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    assert_eq!(cdr::cdr_serialized_size(&data, 0).unwrap(), bytes.len());

    let decoded = cdr::deserialize(&reading_type, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.equals(&data));
    assert_eq!(decoded.get_uint32_value(id_id).unwrap(), 42);
    assert_eq!(decoded.get_string_value(loc_id).unwrap(), "Building A");
}

#[test]
fn inherited_struct_flattens_base_members_into_one_id_space() {
    let factory = DynamicTypeBuilderFactory::new();
    let i32t = factory.create_primitive(TypeKind::Int32);

    let mut base_builder = factory.create_structure_builder("Base");
    let base_id = base_builder.add_member(MemberDescriptor::new("base_field", i32t.clone())).unwrap();
    let base_type = base_builder.build().unwrap();

    let mut derived_builder = factory.create_structure_builder("Derived");
    derived_builder.set_base_type(&base_type);
    let derived_id = derived_builder.add_member(MemberDescriptor::new("derived_field", i32t)).unwrap();
    let derived_type = derived_builder.build().unwrap();

    let ordered = derived_type.all_members_ordered();
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].id, base_id);
    assert_eq!(ordered[1].id, derived_id);

    let mut data = DynamicData::create(derived_type.clone());
    data.set_int32_value(base_id, 1).unwrap();
    data.set_int32_value(derived_id, 2).unwrap();

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    assert_eq!(bytes, vec![1, 0, 0, 0, 2, 0, 0, 0]);

    let decoded = cdr::deserialize(&derived_type, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.equals(&data));
}

#[test]
fn nested_struct_member_round_trips() {
    let factory = DynamicTypeBuilderFactory::new();
    let f64t = factory.create_primitive(TypeKind::Float64);

    let mut vec3_builder = factory.create_structure_builder("Vector3");
    let x_id = vec3_builder.add_member(MemberDescriptor::new("x", f64t.clone())).unwrap();
    let y_id = vec3_builder.add_member(MemberDescriptor::new("y", f64t.clone())).unwrap();
    let z_id = vec3_builder.add_member(MemberDescriptor::new("z", f64t)).unwrap();
    let vec3_type = vec3_builder.build().unwrap();

    let mut pose_builder = factory.create_structure_builder("Pose");
    let pos_id = pose_builder.add_member(MemberDescriptor::new("position", vec3_type.clone())).unwrap();
    let pose_type = pose_builder.build().unwrap();

    let mut data = DynamicData::create(pose_type.clone());
    {
        let position = data.child_mut(pos_id).unwrap();
        position.set_float64_value(x_id, 1.0).unwrap();
        position.set_float64_value(y_id, 2.0).unwrap();
        position.set_float64_value(z_id, 3.0).unwrap();
    }

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    let decoded = cdr::deserialize(&pose_type, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.equals(&data));
    assert_eq!(decoded.child(pos_id).unwrap().get_float64_value(y_id).unwrap(), 2.0);
}

#[test]
fn sequence_of_primitives_round_trips_and_sizes_match() {
    let factory = DynamicTypeBuilderFactory::new();
    let u32t = factory.create_primitive(TypeKind::Uint32);
    let seq_t = factory.create_sequence_type(&u32t, 0);

    let mut data = DynamicData::create(seq_t.clone());
    for i in 0..256u32 {
        let id = data.insert_sequence_data().unwrap();
        data.set_uint32_value(id, i).unwrap();
    }

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    assert_eq!(cdr::cdr_serialized_size(&data, 0).unwrap(), bytes.len());

    let decoded = cdr::deserialize(&seq_t, &bytes, cdr::Endianness::Little).unwrap();
    assert_eq!(decoded.item_count(), 256);
    assert!(decoded.equals(&data));
}

#[test]
fn map_round_trips_as_ordered_key_value_pairs() {
    let factory = DynamicTypeBuilderFactory::new();
    let i32t = factory.create_primitive(TypeKind::Int32);
    let string_t = factory.create_string_type(0);
    let map_t = factory.create_map_type(&i32t, &string_t, 0);

    let mut data = DynamicData::create(map_t.clone());
    for (k, v) in [(1, "one"), (2, "two")] {
        let mut key = DynamicData::create(i32t.clone());
        key.set_int32_value(MemberId::INVALID, k).unwrap();
        let mut value = DynamicData::create(string_t.clone());
        value.set_string_value(MemberId::INVALID, v).unwrap();
        data.insert_map_data(key, Some(value)).unwrap();
    }

    // Duplicate key is rejected.
    let mut dup_key = DynamicData::create(i32t.clone());
    dup_key.set_int32_value(MemberId::INVALID, 1).unwrap();
    assert_eq!(data.insert_map_data(dup_key, None), Err(crate::error::ReturnCode::BadParameter));

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    let decoded = cdr::deserialize(&map_t, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.equals(&data));
}

#[test]
fn enum_accessible_by_value_and_by_literal_name() {
    let factory = DynamicTypeBuilderFactory::new();
    let mut builder = factory.create_enum_builder("Status");
    let active_id = builder
        .add_member(MemberDescriptor::new("ACTIVE", factory.create_primitive(TypeKind::Int32)).with_default("1"))
        .unwrap();
    builder
        .add_member(MemberDescriptor::new("INACTIVE", factory.create_primitive(TypeKind::Int32)).with_default("0"))
        .unwrap();
    let status_type = builder.build().unwrap();

    let mut data = DynamicData::create(status_type.clone());
    data.set_enum_literal_name(MemberId::INVALID, "ACTIVE").unwrap();
    assert_eq!(data.get_enum_value(MemberId::INVALID).unwrap(), active_id.0);
    assert_eq!(data.get_enum_literal_name(MemberId::INVALID).unwrap(), "ACTIVE");
    assert_eq!(
        data.set_enum_literal_name(MemberId::INVALID, "UNKNOWN"),
        Err(crate::error::ReturnCode::BadParameter)
    );

    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    let decoded = cdr::deserialize(&status_type, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.equals(&data));
}

#[test]
fn bitmask_flags_addressable_by_name() {
    let factory = DynamicTypeBuilderFactory::new();
    let mut builder = factory.create_bitmask_builder("Flags", 9);
    let bool_t = factory.create_primitive(TypeKind::Boolean);
    builder.add_member(MemberDescriptor::new("low", bool_t.clone()).with_id(MemberId(0))).unwrap();
    builder.add_member(MemberDescriptor::new("high", bool_t).with_id(MemberId(8))).unwrap();
    let flags_type = builder.build().unwrap();

    let mut data = DynamicData::create(flags_type.clone());
    let high_id = flags_type.get_member_id_by_name("high");
    data.set_flag(high_id, true).unwrap();

    // bit_bound 9 rounds up to a 2-byte storage width (§8 boundary behavior).
    let bytes = cdr::serialize(&data, cdr::Endianness::Little).unwrap();
    assert_eq!(bytes, vec![0x00, 0x01]);

    let decoded = cdr::deserialize(&flags_type, &bytes, cdr::Endianness::Little).unwrap();
    assert!(decoded.get_flag(high_id).unwrap());
    assert!(!decoded.get_flag(MemberId(0)).unwrap());
}

#[test]
fn unicode_strings_round_trip_through_string8_and_string16() {
    let factory = DynamicTypeBuilderFactory::new();
    let string_t = factory.create_string_type(0);
    let wstring_t = factory.create_wstring_type(0);

    let mut s8 = DynamicData::create(string_t.clone());
    s8.set_string_value(MemberId::INVALID, "Hello \u{4e16}\u{754c}!").unwrap();
    let bytes = cdr::serialize(&s8, cdr::Endianness::Little).unwrap();
    let decoded = cdr::deserialize(&string_t, &bytes, cdr::Endianness::Little).unwrap();
    assert_eq!(decoded.get_string_value(MemberId::INVALID).unwrap(), "Hello \u{4e16}\u{754c}!");

    let mut s16 = DynamicData::create(wstring_t.clone());
    s16.set_wstring_value(MemberId::INVALID, "\u{4e16}\u{754c}").unwrap();
    let bytes16 = cdr::serialize(&s16, cdr::Endianness::Little).unwrap();
    let decoded16 = cdr::deserialize(&wstring_t, &bytes16, cdr::Endianness::Little).unwrap();
    assert_eq!(decoded16.get_wstring_value(MemberId::INVALID).unwrap(), "\u{4e16}\u{754c}");
}

#[test]
fn aggregate_equality_treats_cleared_member_as_its_declared_default() {
    let factory = DynamicTypeBuilderFactory::new();
    let i32t = factory.create_primitive(TypeKind::Int32);
    let string_t = factory.create_string_type(0);

    let mut builder = factory.create_structure_builder("Named");
    let id_id = builder.add_member(MemberDescriptor::new("id", i32t)).unwrap();
    let name_id = builder
        .add_member(
            MemberDescriptor::new("name", string_t)
                .with_default("x")
                .with_annotation(AnnotationDescriptor::new("optional")),
        )
        .unwrap();
    let t = builder.build().unwrap();

    let mut a = DynamicData::create(t.clone());
    a.set_int32_value(id_id, 1).unwrap();
    a.set_string_value(name_id, "x").unwrap();

    let mut b = DynamicData::create(t);
    b.set_int32_value(id_id, 1).unwrap();
    b.clear_value(name_id).unwrap();

    assert!(a.equals(&b));
    a.set_string_value(name_id, "y").unwrap();
    assert!(!a.equals(&b));
}

#[test]
fn loan_blocks_overlapping_loan_and_deletion() {
    let factory = DynamicTypeBuilderFactory::new();
    let i32t = factory.create_primitive(TypeKind::Int32);
    let mut builder = factory.create_structure_builder("S");
    let a_id = builder.add_member(MemberDescriptor::new("a", i32t)).unwrap();
    let t = builder.build().unwrap();

    let data_factory = DynamicDataFactory::new();
    let (mut data, handle) = data_factory.create_data(t);
    let loaned = data.loan_value(a_id).unwrap();
    assert_eq!(data.loan_value(a_id).unwrap_err(), crate::error::ReturnCode::PreconditionNotMet);
    assert_eq!(
        data_factory.delete_data(&mut data, handle),
        Err(crate::error::ReturnCode::PreconditionNotMet)
    );
    data.return_loaned_value(a_id, loaned).unwrap();
    data_factory.delete_data(&mut data, handle).unwrap();
}

#[test]
fn max_size_bounds_every_valid_instance() {
    let factory = DynamicTypeBuilderFactory::new();
    let i32t = factory.create_primitive(TypeKind::Int32);
    let string_t = factory.create_string_type(8);
    let seq_t = factory.create_sequence_type(&i32t, 4);

    let mut builder = factory.create_structure_builder("Bounded");
    let name_id = builder.add_member(MemberDescriptor::new("name", string_t)).unwrap();
    let values_id = builder.add_member(MemberDescriptor::new("values", seq_t)).unwrap();
    let t = builder.build().unwrap();

    let max = cdr::max_cdr_serialized_size(&t, 0).unwrap();

    let mut data = DynamicData::create(t);
    data.set_string_value(name_id, "abcdefgh").unwrap();
    for i in 0..4 {
        let id = data.child_mut(values_id).unwrap().insert_sequence_data().unwrap();
        data.child_mut(values_id).unwrap().set_int32_value(id, i).unwrap();
    }
    let actual = cdr::cdr_serialized_size(&data, 0).unwrap();
    assert!(actual <= max, "actual {actual} exceeds predicted max {max}");
}

#[test]
fn builder_rejects_inconsistent_union_before_freezing() {
    let factory = DynamicTypeBuilderFactory::new();
    let i16t = factory.create_primitive(TypeKind::Int16);
    let mut desc = TypeDescriptor::leaf(TypeKind::Union, "Bad");
    // No discriminator_type set: build() must refuse to freeze this.
    desc.members.push(DynamicTypeMember::new(MemberId(0), "s", 0, i16t.handle()));
    let err = desc.validate(&crate::dynamic::annotation::AnnotationStore::new(), factory.registry());
    assert_eq!(err, Err(crate::error::ReturnCode::BadParameter));
}
