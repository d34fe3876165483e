// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP service for the plant register bank
//!
//! Each accepted connection gets one `WtpModbusServer` service instance.
//! Reads take the bank read lock for the duration of the register copy, so
//! every response is a coherent slice of a single tick. Writes never touch
//! the bank directly: they are queued and the scan orchestrator applies
//! them at the next command drain, which is what gives coil commands their
//! documented one-tick visibility bound.

use std::future;
use std::sync::{Arc, RwLock};

use log::{debug, error};

use tokio_modbus::prelude::*;

use crate::registers::{PendingWrites, RegisterBank, WriteOp};

/// A Modbus TCP server implementation for the water treatment plant RTU.
///
/// Supported function codes:
///
/// - 0x01: Read Coils
/// - 0x02: Read Discrete Inputs
/// - 0x03: Read Holding Registers
/// - 0x04: Read Input Registers
/// - 0x05: Write Single Coil
/// - 0x06: Write Single Holding Register
/// - 0x0F: Write Multiple Coils
/// - 0x10: Write Multiple Holding Registers
///
/// Any other function code returns an IllegalFunction exception; reads or
/// writes outside the register map return IllegalDataAddress.
///
/// ### Thread Safety
///
/// The bank sits behind a reader-writer lock shared with the scan
/// orchestrator; the pending-write queue has its own lock. The service is
/// cheap to clone, one per connection.
#[derive(Clone)]
pub struct WtpModbusServer {
    bank: Arc<RwLock<RegisterBank>>,
    pending: Arc<PendingWrites>,
}

impl WtpModbusServer {
    pub fn new(bank: Arc<RwLock<RegisterBank>>, pending: Arc<PendingWrites>) -> Self {
        Self { bank, pending }
    }

    fn read_bank<T>(
        &self,
        read: impl FnOnce(&RegisterBank) -> Option<Vec<T>>,
    ) -> Result<Vec<T>, ExceptionCode> {
        let bank = self.bank.read().map_err(|_| {
            error!("Register bank lock poisoned during Modbus read");
            ExceptionCode::ServerDeviceFailure
        })?;
        read(&bank).ok_or_else(|| {
            error!("Exception::IllegalDataAddress - read outside register map");
            ExceptionCode::IllegalDataAddress
        })
    }

    /// Queue writes after validating every target address, so a bad batch
    /// is rejected whole and nothing is half-applied.
    fn queue_writes(&self, ops: Vec<WriteOp>) -> Result<(), ExceptionCode> {
        if ops.iter().all(RegisterBank::writable) {
            for op in ops {
                self.pending.push(op);
            }
            Ok(())
        } else {
            error!("Exception::IllegalDataAddress - write outside register map");
            Err(ExceptionCode::IllegalDataAddress)
        }
    }
}

impl tokio_modbus::server::Service for WtpModbusServer {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadCoils(addr, cnt) => self
                .read_bank(|bank| bank.read_coils(addr, cnt))
                .map(Response::ReadCoils),
            Request::ReadDiscreteInputs(addr, cnt) => self
                .read_bank(|bank| bank.read_discrete(addr, cnt))
                .map(Response::ReadDiscreteInputs),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .read_bank(|bank| bank.read_holding(addr, cnt))
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .read_bank(|bank| bank.read_input(addr, cnt))
                .map(Response::ReadInputRegisters),
            Request::WriteSingleCoil(addr, value) => self
                .queue_writes(vec![WriteOp::Coil { addr, value }])
                .map(|_| Response::WriteSingleCoil(addr, value)),
            Request::WriteSingleRegister(addr, value) => self
                .queue_writes(vec![WriteOp::Holding { addr, value }])
                .map(|_| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleCoils(addr, values) => {
                let ops = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| WriteOp::Coil {
                        addr: addr + i as u16,
                        value: *v,
                    })
                    .collect();
                self.queue_writes(ops)
                    .map(|_| Response::WriteMultipleCoils(addr, values.len() as u16))
            }
            Request::WriteMultipleRegisters(addr, values) => {
                let ops = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| WriteOp::Holding {
                        addr: addr + i as u16,
                        value: *v,
                    })
                    .collect();
                self.queue_writes(ops)
                    .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_modbus::server::Service;

    fn service() -> (WtpModbusServer, Arc<PendingWrites>) {
        let bank = Arc::new(RwLock::new(RegisterBank::new()));
        let pending = Arc::new(PendingWrites::new());
        (WtpModbusServer::new(bank, pending.clone()), pending)
    }

    #[tokio::test]
    async fn writes_land_in_the_pending_queue_not_the_bank() {
        let (service, pending) = service();

        let response = service
            .call(Request::WriteSingleCoil(4, true))
            .await
            .unwrap();
        assert!(matches!(response, Response::WriteSingleCoil(4, true)));

        // Nothing applied to the bank yet.
        let coil = service.read_bank(|b| b.read_coils(4, 1)).unwrap();
        assert_eq!(coil, vec![false]);

        assert_eq!(pending.drain(), vec![WriteOp::Coil { addr: 4, value: true }]);
    }

    #[tokio::test]
    async fn batch_write_with_bad_tail_is_rejected_whole() {
        let (service, pending) = service();

        // Coils 6..9 run past the 8-coil map.
        let result = service
            .call(Request::WriteMultipleCoils(6, vec![true; 3].into()))
            .await;
        assert!(matches!(result, Err(ExceptionCode::IllegalDataAddress)));
        assert!(pending.drain().is_empty());
    }

    #[tokio::test]
    async fn out_of_map_read_is_illegal_data_address() {
        let (service, _) = service();
        let result = service.call(Request::ReadInputRegisters(3, 1)).await;
        assert!(matches!(result, Err(ExceptionCode::IllegalDataAddress)));
    }
}
