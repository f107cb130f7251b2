#![no_std]
#![no_main]

use cyw43::{JoinOptions, aligned_bytes};
use cyw43_pio::{PioSpi, RM2_CLOCK_DIVIDER};
use defmt::*;
use embassy_executor::Spawner;
use embassy_net::{Config, Stack, StackResources};
use embassy_rp::{
    adc::{self, Adc, Async},
    bind_interrupts,
    clocks::RoscRng,
    gpio::{Level, Output, Pull},
    peripherals::{DMA_CH0, PIO0},
    pio::{InterruptHandler, Pio},
};
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use hallmon_edge::{
    AnalogSource, ChannelId, Credentials, Engine, Network, SensorError, TcpLink, TelemetryConfig,
    WebSocket,
};

const ANALOG_CHANNEL: ChannelId = ChannelId(0);
const HALL_CHANNEL: ChannelId = ChannelId(1);

const CREDENTIALS: Credentials<'static> = Credentials {
    ssid: env!("WIFI_NETWORK"),
    password: env!("WIFI_PASSWORD"),
};

static RX_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();
static TX_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
    ADC_IRQ_FIFO => adc::InterruptHandler;
});

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<
        'static,
        cyw43::SpiBus<Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
    >,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// CYW43 association plus DHCP on the embassy-net stack.
struct Cyw43Network {
    control: cyw43::Control<'static>,
    stack: Stack<'static>,
    credentials: Credentials<'static>,
}

impl Cyw43Network {
    async fn join(&mut self, ssid: &str, password: &str) -> bool {
        match self
            .control
            .join(ssid, JoinOptions::new(password.as_bytes()))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                info!("join failed: {:?}", err);
                false
            }
        }
    }
}

impl Network for Cyw43Network {
    async fn begin(&mut self, credentials: &Credentials<'_>) {
        self.join(credentials.ssid, credentials.password).await;
    }

    async fn is_joined(&mut self) -> bool {
        if !self.stack.is_link_up() {
            // one join attempt per poll so the association bound holds
            let Credentials { ssid, password } = self.credentials;
            self.join(ssid, password).await;
            return false;
        }

        self.stack.is_config_up()
    }
}

/// GPIO26 carries the general analog input, GPIO27 the hall sensor.
struct BoardAdc {
    adc: Adc<'static, Async>,
    analog: adc::Channel<'static>,
    hall: adc::Channel<'static>,
}

impl AnalogSource for BoardAdc {
    async fn read(&mut self, channel: ChannelId) -> Result<u16, SensorError> {
        let pin = match channel {
            ANALOG_CHANNEL => &mut self.analog,
            HALL_CHANNEL => &mut self.hall,
            other => return Err(SensorError::UnknownChannel(other)),
        };

        self.adc.read(pin).await.map_err(|_| SensorError::Timeout)
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let fw = aligned_bytes!("../assets/cyw43-firmware/43439A0.bin");
    let clm = aligned_bytes!("../assets/cyw43-firmware/43439A0_clm.bin");
    let nvram = aligned_bytes!("../assets/cyw43-firmware/nvram_rp2040.bin");

    let pwr = Output::new(p.PIN_23, Level::Low);
    let cs = Output::new(p.PIN_25, Level::High);
    let mut pio = Pio::new(p.PIO0, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        // SPI communication won't work if the speed is too high, so we use a divider larger than `DEFAULT_CLOCK_DIVIDER`.
        // See: https://github.com/embassy-rs/embassy/issues/3960.
        RM2_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        p.PIN_24,
        p.PIN_29,
        p.DMA_CH0,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw, nvram).await;
    spawner.spawn(unwrap!(cyw43_task(runner)));

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;

    let dhcp_config = Config::dhcpv4(Default::default());
    let seed = RoscRng.next_u64();
    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        dhcp_config,
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(unwrap!(net_task(runner)));

    let adc = BoardAdc {
        adc: Adc::new(p.ADC, Irqs, adc::Config::default()),
        analog: adc::Channel::new_pin(p.PIN_26, Pull::None),
        hall: adc::Channel::new_pin(p.PIN_27, Pull::None),
    };

    let rx_buffer = RX_BUFFER.init([0; 1024]);
    let tx_buffer = TX_BUFFER.init([0; 1024]);
    let transport = WebSocket::new(TcpLink::new(stack, rx_buffer, tx_buffer), RoscRng);

    let config = TelemetryConfig {
        analog_channel: ANALOG_CHANNEL,
        hall_channel: HALL_CHANNEL,
        ..TelemetryConfig::DEFAULT
    };

    let network = Cyw43Network {
        control,
        stack,
        credentials: CREDENTIALS,
    };
    let engine = Engine::new(network, transport, adc, Delay, config);

    info!("starting telemetry");
    let running = unwrap!(engine.start(&CREDENTIALS).await);
    running.run().await
}
