//! TS muxer: wraps ES/PES payloads as 188-byte TS packets with continuity
//! counters, adaptation-field PCR/stuffing, and periodic PAT+PMT emission.

use std::collections::HashMap;

use crate::error::Result;
use crate::io::ByteSink;
use crate::pes;
use crate::ts::packet::{Pcr, PACKET_LEN, SYNC_BYTE};
use crate::ts::pat_pmt::{self, ProgramMap, PAT_PID};

const PACKET_BODY: usize = PACKET_LEN - 4;

/// Debug packet-drop policy: retain `drop_keep` packets, then discard
/// `drop_drop`, repeating.
#[derive(Debug, Clone, Copy)]
pub struct DropPolicy {
    pub drop_keep: u32,
    pub drop_drop: u32,
}

impl Default for DropPolicy {
    fn default() -> Self {
        DropPolicy {
            drop_keep: u32::MAX,
            drop_drop: 0,
        }
    }
}

pub struct Muxer<K: ByteSink> {
    sink: K,
    continuity: HashMap<u16, u8>,
    program: ProgramMap,
    pat_pmt_interval: u32,
    packets_since_tables: u32,
    drop_policy: DropPolicy,
    packets_offered: u64,
    packets_written: u64,
}

impl<K: ByteSink> Muxer<K> {
    pub fn new(sink: K, program: ProgramMap, pat_pmt_interval: u32) -> Self {
        Muxer {
            sink,
            continuity: HashMap::new(),
            program,
            pat_pmt_interval,
            // Force emission before the first data packet.
            packets_since_tables: pat_pmt_interval,
            drop_policy: DropPolicy::default(),
            packets_offered: 0,
            packets_written: 0,
        }
    }

    pub fn set_drop_policy(&mut self, policy: DropPolicy) {
        self.drop_policy = policy;
        self.packets_offered = 0;
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.continuity.entry(pid).or_insert(0);
        let v = *cc;
        *cc = (*cc + 1) % 16;
        v
    }

    fn should_keep(&mut self) -> bool {
        let cycle = self.drop_policy.drop_keep as u64 + self.drop_policy.drop_drop as u64;
        if cycle == 0 {
            return true;
        }
        let pos = self.packets_offered % cycle;
        self.packets_offered += 1;
        pos < self.drop_policy.drop_keep as u64
    }

    fn write_raw(&mut self, packet: &[u8; PACKET_LEN]) -> Result<()> {
        if !self.should_keep() {
            return Ok(());
        }
        self.sink.write(packet)?;
        self.packets_written += 1;
        Ok(())
    }

    /// Writes a one-packet section (PAT or PMT), with the `payload_unit_start`
    /// pointer-field byte.
    fn write_section(&mut self, pid: u16, section: &[u8]) -> Result<()> {
        let mut packet = [0xFFu8; PACKET_LEN];
        packet[0] = SYNC_BYTE;
        packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F); // PUSI=1
        packet[2] = (pid & 0xFF) as u8;
        let cc = self.next_cc(pid);
        packet[3] = 0b0001_0000 | cc; // payload only

        packet[4] = 0x00; // pointer_field: section starts immediately
        let avail = PACKET_BODY - 1;
        let n = section.len().min(avail);
        packet[5..5 + n].copy_from_slice(&section[..n]);
        self.write_raw(&packet)
    }

    pub fn emit_tables(&mut self) -> Result<()> {
        let pat = pat_pmt::build_pat_section(&self.program);
        self.write_section(PAT_PID, &pat)?;
        let pmt = pat_pmt::build_pmt_section(&self.program);
        let pmt_pid = self.program.pmt_pid;
        self.write_section(pmt_pid, &pmt)?;
        self.packets_since_tables = 0;
        Ok(())
    }

    /// Computes `(payload_take, adaptation_present, pcr_present, stuffing)`
    /// for one packet, given how many PES bytes remain and whether this
    /// packet should carry `needs_pcr`.
    fn layout(remaining: usize, needs_pcr: bool) -> (usize, bool, bool, usize) {
        let overhead0 = if needs_pcr { 8 } else { 0 };
        let capacity0 = PACKET_BODY - overhead0;
        let mut take = remaining.min(capacity0);
        let slack = capacity0 - take;
        if slack == 0 {
            return (take, needs_pcr, needs_pcr, 0);
        }
        if needs_pcr {
            return (take, true, true, slack);
        }
        if slack == 1 {
            take -= 1;
            return (take, true, false, 1);
        }
        (take, true, false, slack - 2)
    }

    /// Packetizes one PES (stream_id/pts/dts/payload) onto `pid`, requesting
    /// a PCR on the first TS packet when `pcr` is given.
    pub fn mux_pes(
        &mut self,
        pid: u16,
        stream_id: u8,
        pts: Option<u64>,
        dts: Option<u64>,
        payload: &[u8],
        pcr: Option<u64>,
    ) -> Result<()> {
        if self.packets_since_tables >= self.pat_pmt_interval {
            self.emit_tables()?;
        }

        let probe_header = pes::build_header(stream_id, 0, pts, dts);
        let optional_len = probe_header.len() - 3;
        let total = optional_len + payload.len();
        let packet_length = if total > 0xFFFF - 6 { 0 } else { total as u16 };
        let header = pes::build_header(stream_id, packet_length, pts, dts);

        let mut full = Vec::with_capacity(3 + header.len() + payload.len());
        full.extend_from_slice(&pes::PES_START_CODE_PREFIX);
        full.extend_from_slice(&header);
        full.extend_from_slice(payload);

        let mut pos = 0;
        let mut first = true;
        while pos < full.len() {
            let remaining = full.len() - pos;
            let needs_pcr = first && pcr.is_some();
            let (take, adaptation_present, pcr_present, stuffing) = Self::layout(remaining, needs_pcr);

            let mut packet = [0xFFu8; PACKET_LEN];
            packet[0] = SYNC_BYTE;
            packet[1] = (if first { 0x40 } else { 0 }) | ((pid >> 8) as u8 & 0x1F);
            packet[2] = (pid & 0xFF) as u8;

            let has_payload = take > 0;
            let afc = match (adaptation_present, has_payload) {
                (false, true) => 0b01,
                (true, true) => 0b11,
                (true, false) => 0b10,
                (false, false) => 0b01, // degenerate; never produced by layout()
            };
            let cc = if has_payload { self.next_cc(pid) } else { 0 };
            packet[3] = (afc << 4) | cc;

            let mut body_pos = 4;
            if adaptation_present {
                let pcr_bytes = if pcr_present {
                    Some(Pcr::from_27mhz(pcr.unwrap()).to_bytes())
                } else {
                    None
                };
                let adaptation_field_length =
                    1 + if pcr_present { 6 } else { 0 } + stuffing;
                packet[body_pos] = adaptation_field_length as u8;
                packet[body_pos + 1] = if pcr_present { 0x10 } else { 0x00 };
                body_pos += 2;
                if let Some(p) = pcr_bytes {
                    packet[body_pos..body_pos + 6].copy_from_slice(&p);
                    body_pos += 6;
                }
                for b in &mut packet[body_pos..body_pos + stuffing] {
                    *b = 0xFF;
                }
                body_pos += stuffing;
            }
            packet[body_pos..body_pos + take].copy_from_slice(&full[pos..pos + take]);

            self.write_raw(&packet)?;
            self.packets_since_tables += 1;
            pos += take;
            first = false;
        }

        Ok(())
    }

    pub fn into_inner(self) -> K {
        self.sink
    }
}
