use super::*;

#[test]
fn hresult_failure_is_the_sign_bit() {
    assert!(!Hresult::S_OK.failed());
    assert!(!Hresult::S_FALSE.failed());
    assert!(Hresult::E_PENDING.failed());
    assert!(Hresult::E_FAIL.failed());
    assert_eq!(Hresult::S_FALSE.to_result(), Ok(()));
    assert_eq!(Hresult::E_FAIL.to_result(), Err(Hresult::E_FAIL));
}

#[test]
fn hresult_displays_as_unsigned_hex() {
    assert_eq!(Hresult::E_PENDING.to_string(), "0x8000000a");
    assert_eq!(Hresult::S_OK.to_string(), "0x00000000");
}

#[test]
fn hresult_serializes_as_bare_integer() {
    let json = serde_json::to_string(&Hresult::E_FAIL).unwrap();
    assert_eq!(json, (0x8000_4005_u32 as i32).to_string());
    let back: Hresult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, Hresult::E_FAIL);
}

#[test]
fn buffer_type_wire_codes_match_native_values() {
    assert_eq!(BufferType::PictureParameters.as_raw(), 0);
    assert_eq!(BufferType::InverseQuantizationMatrix.as_raw(), 4);
    assert_eq!(BufferType::SliceControl.as_raw(), 5);
    assert_eq!(BufferType::Bitstream.as_raw(), 6);
    assert_eq!(BufferType::FilmGrain.as_raw(), 8);

    for raw in 0..9 {
        assert_eq!(BufferType::from_raw(raw).unwrap().as_raw(), raw);
    }
    assert_eq!(BufferType::from_raw(9), None);
}

#[test]
fn buffer_type_display_names_type_and_code() {
    assert_eq!(BufferType::Bitstream.to_string(), "bitstream (6)");
    assert_eq!(
        BufferType::InverseQuantizationMatrix.to_string(),
        "inverse quantization matrix (4)"
    );
}

#[test]
fn backend_kind_serde_names() {
    assert_eq!(
        serde_json::to_string(&BackendKind::ArraySlice).unwrap(),
        "\"array-slice\""
    );
    let k: BackendKind = serde_json::from_str("\"pool-indexed\"").unwrap();
    assert_eq!(k, BackendKind::PoolIndexed);
}
