//! Creates the embassy USB stack, and carries the host link over a CDC-ACM
//! serial port.
//!
//! Received packets go straight into the framed ring.  Replies are written
//! by the protocol handler to [`PipeLink`], and a separate task drains that
//! into the IN endpoint, so the protocol handler never waits on the host.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::util::log::{debug, error, info, trace, warn};
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver as RpUsbDriver, InterruptHandler};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};
use portable_atomic::{AtomicBool, Ordering};
use static_cell::{ConstStaticCell, StaticCell};

use crate::constants::{
    LINK_TX_BUF_SIZE, MAX_EP_PACKET_SIZE, MAX_EP_PACKET_SIZE_USIZE, MAX_PACKET_SIZE_0,
    USB_MANUFACTURER, USB_POWER_MA, USB_PRODUCT, USB_PRODUCT_ID, USB_SERIAL, USB_VENDOR_ID,
};
use crate::link::{LinkWriter, Producer, Push};

pub type UsbDriver = RpUsbDriver<'static, USB>;

// Bind the hardware USB interrupt to the USB stack.
bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

// The USB device is handed to usb_task() by mutable reference, so has to
// live in a static.
static USB_DEVICE: StaticCell<UsbDevice<'static, UsbDriver>> = StaticCell::new();

static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

// Descriptor and control buffers, owned by the USB builder.
static CONFIG_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static BOS_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static MSOS_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static CONTROL_BUF: ConstStaticCell<[u8; 64]> = ConstStaticCell::new([0; 64]);

// Bytes from the protocol handler on their way to the host.
static TX_PIPE: Pipe<CriticalSectionRawMutex, LINK_TX_BUF_SIZE> = Pipe::new();

// Whether a host has the serial port open.  Output is dropped while not.
static CONNECTED: AtomicBool = AtomicBool::new(false);

/// Everything the USB tasks need.
pub struct UsbStack {
    pub device: &'static mut UsbDevice<'static, UsbDriver>,
    pub tx: Sender<'static, UsbDriver>,
    pub rx: Receiver<'static, UsbDriver>,
}

impl UsbStack {
    /// Creates the USB device and its one CDC-ACM function.
    pub fn create_static(p_usb: USB) -> Self {
        let driver = RpUsbDriver::new(p_usb, Irqs);

        let mut config = Config::new(USB_VENDOR_ID, USB_PRODUCT_ID);
        config.manufacturer = Some(USB_MANUFACTURER);
        config.product = Some(USB_PRODUCT);
        config.serial_number = Some(USB_SERIAL);
        config.max_power = USB_POWER_MA;
        config.max_packet_size_0 = MAX_PACKET_SIZE_0;

        // CDC-ACM uses an interface association, so the device is
        // "miscellaneous, IAD".
        config.device_class = 0xEF;
        config.device_sub_class = 0x02;
        config.device_protocol = 0x01;
        config.composite_with_iads = true;

        let mut builder = Builder::new(
            driver,
            config,
            CONFIG_DESC.take(),
            BOS_DESC.take(),
            MSOS_DESC.take(),
            CONTROL_BUF.take(),
        );

        let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), MAX_EP_PACKET_SIZE);
        let (tx, rx) = class.split();

        let device = USB_DEVICE.init(builder.build());

        Self { device, tx, rx }
    }
}

/// Runs the USB stack.
#[embassy_executor::task]
pub async fn usb_task(usb: &'static mut UsbDevice<'static, UsbDriver>) -> ! {
    let core = embassy_rp::pac::SIO.cpuid().read();
    info!("Core{}: USB task started", core);

    loop {
        // Not cancel safe, but this task is never cancelled.
        usb.run_until_suspend().await;
        usb.wait_resume().await;
    }
}

/// Feeds packets from the host into the framed ring.  Each packet is one
/// receive event - anything after the end of a record within it is dropped.
#[embassy_executor::task]
pub async fn link_rx_task(mut rx: Receiver<'static, UsbDriver>, mut records: Producer<'static>) -> ! {
    let mut buf = [0; MAX_EP_PACKET_SIZE_USIZE];

    loop {
        rx.wait_connection().await;
        info!("Host connected");
        CONNECTED.store(true, Ordering::Release);

        loop {
            match rx.read_packet(&mut buf).await {
                Ok(len) => {
                    if records.push_chunk(&buf[..len]) == Push::Overflow {
                        warn!("Host link buffer full, record dropped");
                    }
                }
                Err(EndpointError::BufferOverflow) => warn!("USB packet too large"),
                Err(EndpointError::Disabled) => break,
            }
        }

        CONNECTED.store(false, Ordering::Release);
        records.discard();
        TX_PIPE.clear();
        info!("Host disconnected");
    }
}

/// Drains [`PipeLink`] output to the host.
#[embassy_executor::task]
pub async fn link_tx_task(mut tx: Sender<'static, UsbDriver>) -> ! {
    let mut buf = [0; MAX_EP_PACKET_SIZE_USIZE];

    loop {
        tx.wait_connection().await;

        loop {
            let len = TX_PIPE.read(&mut buf).await;
            if tx.write_packet(&buf[..len]).await.is_err() {
                break;
            }

            // A full packet leaves the host waiting for more, so finish the
            // transfer if there isn't any.
            if len == MAX_EP_PACKET_SIZE_USIZE
                && TX_PIPE.is_empty()
                && tx.write_packet(&[]).await.is_err()
            {
                break;
            }
        }
    }
}

/// [`LinkWriter`] for the protocol handler.  Never blocks - bytes which
/// don't fit, or arrive with no host connected, are dropped.
pub struct PipeLink;

impl LinkWriter for PipeLink {
    fn write_byte(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    fn write_bytes(&mut self, mut bytes: &[u8]) {
        if !CONNECTED.load(Ordering::Acquire) {
            return;
        }

        while !bytes.is_empty() {
            match TX_PIPE.try_write(bytes) {
                Ok(written) => bytes = &bytes[written..],
                Err(_) => {
                    trace!("Host link output full, dropped {} bytes", bytes.len());
                    return;
                }
            }
        }
    }
}
