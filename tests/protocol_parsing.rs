use ud_co2s_lib::serial::protocol::{
    decode_line, encode_start, encode_stop, parse_line, DecodeError,
};
use ud_co2s_lib::{CloseReason, ReadingRecord, ReadingState, SensorReading};

#[test]
fn test_command_frames() {
    assert_eq!(encode_start(), vec![0x53, 0x54, 0x41, 0x0d, 0x0a]);
    assert_eq!(encode_stop(), vec![0x53, 0x54, 0x50, 0x0d, 0x0a]);
    assert_eq!(encode_start(), b"STA\r\n");
    assert_eq!(encode_stop(), b"STP\r\n");
}

#[test]
fn test_parse_acknowledgement() {
    // <Buffer 4f 4b 20 53 54 41 0d 0a>
    assert_eq!(decode_line(b"OK STA\r\n"), SensorReading::Acknowledged);
    assert_eq!(decode_line(b"OK STA"), SensorReading::Acknowledged);
}

#[test]
fn test_parse_measurement() {
    let reading = decode_line(b"CO2=606,HUM=46.5,TMP=29.8\r\n");
    assert_eq!(
        reading,
        SensorReading::Measurement {
            co2: "606".to_string(),
            humidity: "46.5".to_string(),
            temperature: "29.8".to_string(),
        }
    );
    assert_eq!(reading.state(), ReadingState::Connected);
}

#[test]
fn test_measurement_text_is_preserved() {
    let lines = [
        "CO2=0400,HUM=46.50,TMP=-0.0",
        "CO2=1234,HUM=100.0,TMP=30.10",
        "CO2=5000,HUM=5,TMP=19.999",
    ];
    for line in lines {
        match decode_line(line.as_bytes()) {
            SensorReading::Measurement { co2, humidity, temperature } => {
                assert_eq!(format!("CO2={},HUM={},TMP={}", co2, humidity, temperature), line);
            }
            other => panic!("unexpected reading for {}: {:?}", line, other),
        }
    }
}

#[test]
fn test_only_first_line_is_parsed() {
    let reading = decode_line(b"CO2=700,HUM=40.0,TMP=22.1\r\nOK STA\r\n");
    assert!(matches!(reading, SensorReading::Measurement { ref co2, .. } if co2 == "700"));
    assert_eq!(decode_line(b"OK STA\nCO2=1,HUM=2,TMP=3"), SensorReading::Acknowledged);
}

#[test]
fn test_fields_are_positional() {
    // Keys are not checked; a reordered line is mislabelled as-is
    let reading = decode_line(b"TMP=29.8,CO2=606,HUM=46.5");
    assert_eq!(
        reading,
        SensorReading::Measurement {
            co2: "29.8".to_string(),
            humidity: "606".to_string(),
            temperature: "46.5".to_string(),
        }
    );
}

#[test]
fn test_garbage_is_an_error_reading() {
    let reading = decode_line(b"garbage\r\n");
    assert!(reading.is_error());
    assert_eq!(reading.state(), ReadingState::Error);
    assert_eq!(parse_line(b"garbage"), Err(DecodeError::FieldCount(1)));
}

#[test]
fn test_malformed_lines() {
    assert_eq!(parse_line(b""), Err(DecodeError::FieldCount(1)));
    assert_eq!(parse_line(b"CO2=1,HUM=2"), Err(DecodeError::FieldCount(2)));
    assert_eq!(parse_line(b"CO2=1,HUM=2,TMP=3,X=4"), Err(DecodeError::FieldCount(4)));
    assert_eq!(
        parse_line(b"CO2=1,HUM,TMP=3"),
        Err(DecodeError::MissingValue("HUM".to_string()))
    );
    assert!(matches!(parse_line(&[0x43, 0xff, 0xfe, 0x0d, 0x0a]), Err(DecodeError::NotText(_))));
    assert!(decode_line(&[0xff, 0xff]).is_error());
}

#[test]
fn test_error_reading_carries_description() {
    match decode_line(b"CO2=1,HUM=2") {
        SensorReading::Error { message } => {
            assert!(message.contains("got 2"), "message: {}", message)
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_reading_states() {
    assert_eq!(SensorReading::Acknowledged.state(), ReadingState::Ok);
    assert_eq!(
        SensorReading::ConnectionClosed { reason: CloseReason::Disconnected }.state(),
        ReadingState::Warning
    );
    assert_eq!(
        SensorReading::ConnectionClosed { reason: CloseReason::Stopped }.state(),
        ReadingState::Info
    );
}

#[test]
fn test_record_json_shape() {
    let record = ReadingRecord::new(&decode_line(b"CO2=606,HUM=46.5,TMP=29.8\r\n"), None);
    let value = serde_json::to_value(&record).expect("serialize");
    assert_eq!(value["state"], "connected");
    assert_eq!(value["CO2"], "606");
    assert_eq!(value["HUM"], "46.5");
    assert_eq!(value["TMP"], "29.8");
    assert!(value.get("message").is_none());
    assert!(value.get("received_at").is_some());

    let record = ReadingRecord::new(&SensorReading::Acknowledged, None);
    let value = serde_json::to_value(&record).expect("serialize");
    assert_eq!(value["state"], "OK");
    assert!(value.get("CO2").is_none());

    let closed = SensorReading::ConnectionClosed { reason: CloseReason::Stopped };
    let record = ReadingRecord::new(&closed, Some("port is closed".to_string()));
    let value = serde_json::to_value(&record).expect("serialize");
    assert_eq!(value["state"], "info");
    assert_eq!(value["message"], "port is closed");
}
