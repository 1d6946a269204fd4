//! Cross-module integration tests exercising the testable properties from
//! the design spec that span more than one module (datagram round trips,
//! fragment reordering, end-to-end VT feeds).

use mosh_core::ocb3::Ocb3;
use mosh_core::terminal::TerminalParser;
use mosh_core::transport::fragment::{self, Assembler, Fragment};
use mosh_core::transport::packet::{self, Direction, MoshPacket};
use mosh_core::transport::wire::TransportInstruction;

fn test_cipher() -> Ocb3 {
    Ocb3::new(&[0x5Au8; 16]).unwrap()
}

#[test]
fn datagram_seal_open_round_trips_for_both_directions() {
    let cipher = test_cipher();
    for direction in [Direction::ToServer, Direction::ToClient] {
        let packet = MoshPacket {
            sequence_number: 42,
            direction,
            timestamp: 1000,
            timestamp_reply: 2000,
            payload: b"a diff payload".to_vec(),
        };
        let datagram = packet::seal(&cipher, &packet);
        let opened = packet::open(&cipher, &datagram, direction).expect("should open");
        assert_eq!(opened, packet);
    }
}

#[test]
fn nonce_direction_bit_matches_spec_layout() {
    let to_server = packet::build_nonce(Direction::ToServer, 1);
    let to_client = packet::build_nonce(Direction::ToClient, 1);
    assert_eq!(to_server[4] & 0x80, 0);
    assert_eq!(to_client[4] & 0x80, 0x80);
}

#[test]
fn wrong_direction_fails_to_open() {
    let cipher = test_cipher();
    let packet = MoshPacket {
        sequence_number: 1,
        direction: Direction::ToServer,
        timestamp: 0,
        timestamp_reply: 0,
        payload: b"hi".to_vec(),
    };
    let datagram = packet::seal(&cipher, &packet);
    assert!(packet::open(&cipher, &datagram, Direction::ToClient).is_none());
}

#[test]
fn flipped_tag_bit_fails_to_open() {
    let cipher = test_cipher();
    let packet = MoshPacket {
        sequence_number: 1,
        direction: Direction::ToServer,
        timestamp: 0,
        timestamp_reply: 0,
        payload: b"hi".to_vec(),
    };
    let mut datagram = packet::seal(&cipher, &packet);
    let last = datagram.len() - 1;
    datagram[last] ^= 0x01;
    assert!(packet::open(&cipher, &datagram, Direction::ToServer).is_none());
}

fn sample_instruction() -> TransportInstruction {
    TransportInstruction {
        protocol_version: 2,
        old_num: 0,
        new_num: 1,
        ack_num: 0,
        throwaway_num: 0,
        diff: vec![0xAB; 4000],
        chaff: Vec::new(),
    }
}

#[test]
fn single_fragment_instruction_is_final_and_zero_indexed() {
    let compressed = fragment::deflate(&b"small".to_vec());
    let fragments = fragment::fragment_compressed(7, &compressed, fragment::DEFAULT_MTU);
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].is_final);
    assert_eq!(fragments[0].fragment_num, 0);
}

#[test]
fn permuted_fragment_order_still_reassembles() {
    let instruction = sample_instruction();
    let encoded = instruction.encode();
    let compressed = fragment::deflate(&encoded);
    let fragments = fragment::fragment_compressed(99, &compressed, 256);
    assert!(fragments.len() > 1, "need a multi-fragment instruction for this test");

    // Reverse order: still out-of-order delivery relative to fragment_num.
    let mut permuted = fragments.clone();
    permuted.reverse();

    let mut assembler = Assembler::new();
    let mut result = None;
    for fragment in permuted {
        if let Some(bytes) = assembler.feed(fragment) {
            result = Some(bytes);
        }
    }
    let reassembled = result.expect("reassembly should complete");
    let decompressed = fragment::inflate(&reassembled).unwrap();
    assert_eq!(TransportInstruction::decode(&decompressed), instruction);
}

#[test]
fn dropping_a_non_final_fragment_leaves_assembler_unready() {
    let instruction = sample_instruction();
    let encoded = instruction.encode();
    let compressed = fragment::deflate(&encoded);
    let fragments = fragment::fragment_compressed(100, &compressed, 256);
    assert!(fragments.len() > 2, "need several fragments for this test");

    let mut assembler = Assembler::new();
    for fragment in fragments.iter().skip(1) {
        assert!(assembler.feed(fragment.clone()).is_none());
    }
}

#[test]
fn fragment_parse_rejects_short_input() {
    assert!(Fragment::parse(&[0u8; 9]).is_none());
}

#[test]
fn crlf_feed_places_text_on_two_rows() {
    let mut parser = TerminalParser::new(24, 80, 1000);
    parser.feed(b"Hello\r\nWorld");
    let screen = parser.state.active();
    let row0: String = screen.line(0).unwrap().cells()[..5].iter().map(|c| c.character).collect();
    let row1: String = screen.line(1).unwrap().cells()[..5].iter().map(|c| c.character).collect();
    assert_eq!(row0, "Hello");
    assert_eq!(row1, "World");
    assert_eq!(screen.cursor.row, 1);
    assert_eq!(screen.cursor.col, 5);
}

#[test]
fn scrollback_grows_by_one_line_on_overflow() {
    let mut parser = TerminalParser::new(24, 80, 1000);
    for i in 0..25 {
        parser.feed(format!("line{i}\r\n").as_bytes());
    }
    assert_eq!(parser.state.scrollback.len(), 1);
    let first: String = parser.state.scrollback.get(0).unwrap().cells()[..5]
        .iter()
        .map(|c| c.character)
        .collect();
    assert_eq!(first, "line0");
}

#[test]
fn cup_out_of_range_clamps_to_last_cell() {
    let mut parser = TerminalParser::new(24, 80, 1000);
    parser.feed(b"\x1b[999;999H");
    let screen = parser.state.active();
    assert_eq!(screen.cursor.row, 23);
    assert_eq!(screen.cursor.col, 79);
}

#[test]
fn sgr_red_sets_fg_and_resets_after() {
    use mosh_core::terminal::TerminalColor;
    let mut parser = TerminalParser::new(24, 80, 1000);
    parser.feed(b"\x1b[31mR\x1b[0mN");
    let line = parser.state.active().line(0).unwrap();
    assert_eq!(line.cell(0).unwrap().fg, TerminalColor::Indexed(1));
    assert_eq!(line.cell(1).unwrap().fg, TerminalColor::Default);
    assert!(line.cell(1).unwrap().attributes.is_empty());
}

#[test]
fn alternate_screen_preserves_primary_content_and_restores_cursor() {
    let mut parser = TerminalParser::new(24, 80, 1000);
    parser.feed(b"A\x1b[?1049hB\x1b[?1049lC");
    let primary: String = parser.state.primary().line(0).unwrap().cells()[..2]
        .iter()
        .map(|c| c.character)
        .collect();
    assert_eq!(primary, "AC");
    let alternate: String = parser.state.alternate().line(0).unwrap().cells()[..1]
        .iter()
        .map(|c| c.character)
        .collect();
    assert_eq!(alternate, "B");
}
